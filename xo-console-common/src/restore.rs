//! Restore form state and import dispatch
//!
//! The restore dialog is driven by [`RestoreForm::reduce`]. Once confirmed,
//! the form is turned into an [`ImportRequest`] and handed to
//! [`perform_restore`], which talks to the platform through [`BackupApi`].

use std::collections::BTreeMap;
use std::fmt;

use crate::backup::{Backup, BackupType};
use crate::sr::{StorageRepository, is_sr_writable, is_valid_secondary_sr};

/// Calls the restore flow needs from the platform
pub trait BackupApi {
    /// Import a full (xva) backup, returning the new VM id
    fn import_backup(&self, remote: &str, sr: &str, file: &str) -> anyhow::Result<String>;

    /// Import a delta backup, placing each listed disk on its own SR
    fn import_delta_backup(
        &self,
        remote: &str,
        sr: &str,
        file_path: &str,
        map_vdis_srs: &BTreeMap<String, String>,
    ) -> anyhow::Result<String>;

    fn start_vm(&self, id: &str) -> anyhow::Result<()>;
}

/// State of the restore dialog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreForm {
    pub backup: Option<Backup>,
    /// Primary target SR
    pub main_sr: Option<StorageRepository>,
    /// Disk id -> SR override; `None` means "use the primary SR"
    pub map_vdis_srs: BTreeMap<String, Option<StorageRepository>>,
    /// Start the VM once imported
    pub start: bool,
}

/// User interactions with the restore dialog
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreAction {
    SelectBackup(Option<Backup>),
    SelectMainSr(Option<StorageRepository>),
    SetVdiSr {
        vdi: String,
        sr: Option<StorageRepository>,
    },
    ClearVdiSr(String),
    SetStart(bool),
}

impl RestoreForm {
    pub fn new(start: bool) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    /// Apply one user interaction
    pub fn reduce(&mut self, action: RestoreAction) {
        match action {
            RestoreAction::SelectBackup(backup) => {
                let changed = self.backup.as_ref().map(|b| &b.path) != backup.as_ref().map(|b| &b.path);
                if changed {
                    self.map_vdis_srs.clear();
                }
                self.backup = backup;
            }
            RestoreAction::SelectMainSr(new_sr) => self.select_main_sr(new_sr),
            RestoreAction::SetVdiSr { vdi, sr } => {
                self.map_vdis_srs.insert(vdi, sr);
            }
            RestoreAction::ClearVdiSr(vdi) => {
                self.map_vdis_srs.remove(&vdi);
            }
            RestoreAction::SetStart(start) => self.start = start,
        }
    }

    fn select_main_sr(&mut self, new_sr: Option<StorageRepository>) {
        let pool_changed = match (&self.main_sr, &new_sr) {
            (Some(old), Some(new)) => old.pool != new.pool,
            _ => true,
        };

        if pool_changed {
            self.map_vdis_srs.clear();
        } else if let Some(new) = new_sr.as_ref().filter(|sr| !sr.shared) {
            self.map_vdis_srs.retain(|_, selected| match selected {
                Some(sr) => sr.id == new.id || sr.container == new.container || sr.shared,
                None => true,
            });
        }

        self.main_sr = new_sr;
    }

    /// Disks of the selected backup that can be placed individually
    pub fn disks(&self) -> &[crate::backup::BackupDisk] {
        match &self.backup {
            Some(backup) if backup.is_delta() => &backup.vdis,
            _ => &[],
        }
    }

    /// SRs offered as the primary target
    pub fn main_sr_candidates<'a>(
        &self,
        srs: impl IntoIterator<Item = &'a StorageRepository>,
    ) -> Vec<&'a StorageRepository> {
        srs.into_iter().filter(|sr| is_sr_writable(sr)).collect()
    }

    /// SRs offered for a single disk given the current selections
    pub fn secondary_sr_candidates<'a>(
        &self,
        srs: impl IntoIterator<Item = &'a StorageRepository>,
    ) -> Vec<&'a StorageRepository> {
        let Some(main_sr) = &self.main_sr else {
            return Vec::new();
        };
        srs.into_iter()
            .filter(|sr| is_valid_secondary_sr(main_sr, sr, &self.map_vdis_srs))
            .collect()
    }

    /// Validate the selection and build the import request
    pub fn to_request(&self) -> Result<ImportRequest, RestoreError> {
        let (Some(backup), Some(main_sr)) = (&self.backup, &self.main_sr) else {
            return Err(RestoreError::MissingSelection);
        };

        let map_vdis_srs = self
            .map_vdis_srs
            .iter()
            .filter_map(|(vdi, sr)| sr.as_ref().map(|sr| (vdi.clone(), sr.id.clone())))
            .collect();

        Ok(ImportRequest {
            backup_type: backup.backup_type,
            vm_name: backup.name.clone(),
            remote: backup.remote_id.clone(),
            sr: main_sr.id.clone(),
            file: backup.path.clone(),
            map_vdis_srs,
            start: self.start,
        })
    }
}

/// Everything needed to import one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub backup_type: BackupType,
    pub vm_name: String,
    pub remote: String,
    pub sr: String,
    pub file: String,
    /// Disk id -> SR id for disks that do not go to the primary SR
    pub map_vdis_srs: BTreeMap<String, String>,
    pub start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub vm_id: String,
    pub started: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    /// No backup or no primary SR was chosen
    MissingSelection,
    Import(String),
    Start { vm_id: String, message: String },
}

impl RestoreError {
    /// Notification title for this error
    pub fn title(&self) -> &'static str {
        match self {
            RestoreError::MissingSelection => "Missing parameters",
            RestoreError::Import(_) => "VM import",
            RestoreError::Start { .. } => "VM start",
        }
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreError::MissingSelection => write!(f, "Choose a SR and a backup"),
            RestoreError::Import(message) => write!(f, "{message}"),
            RestoreError::Start { vm_id, message } => {
                write!(f, "VM {vm_id} was imported but could not be started: {message}")
            }
        }
    }
}

impl std::error::Error for RestoreError {}

/// Import the requested backup and optionally start the resulting VM
pub fn perform_restore(
    api: &dyn BackupApi,
    request: &ImportRequest,
) -> Result<RestoreOutcome, RestoreError> {
    let imported = match request.backup_type {
        BackupType::Xva => api.import_backup(&request.remote, &request.sr, &request.file),
        BackupType::Delta => api.import_delta_backup(
            &request.remote,
            &request.sr,
            &request.file,
            &request.map_vdis_srs,
        ),
    };
    let vm_id = imported.map_err(|e| RestoreError::Import(e.to_string()))?;
    log::info!("Imported backup of {} as VM {}", request.vm_name, vm_id);

    if request.start {
        api.start_vm(&vm_id).map_err(|e| RestoreError::Start {
            vm_id: vm_id.clone(),
            message: e.to_string(),
        })?;
    }

    Ok(RestoreOutcome {
        vm_id,
        started: request.start,
    })
}

/// Validate the form and run the restore
///
/// `on_submitted` sees the validated request before the first platform call.
/// On missing selection neither it nor the platform is called.
pub fn submit(
    form: &RestoreForm,
    api: &dyn BackupApi,
    on_submitted: impl FnOnce(&ImportRequest),
) -> Result<RestoreOutcome, RestoreError> {
    let request = form.to_request()?;
    on_submitted(&request);
    perform_restore(api, &request)
}
