//! World profiles: which launch configuration the next start uses. The
//! orchestrator only ever reads the selected profile; everything else here is
//! the management surface the command frontend drives.

use std::path::PathBuf;

use anyhow::Context;
use warden_core::WorldProfile;

use crate::error::LifecycleError;

/// Read side the orchestrator depends on: the profile selected at the moment
/// a start command is issued.
pub trait ProfileSource: Send + Sync {
    fn selected_profile(&self) -> impl Future<Output = anyhow::Result<WorldProfile>> + Send;
}

/// A fixed profile is a valid source; handy for embedders and tests.
impl ProfileSource for WorldProfile {
    async fn selected_profile(&self) -> anyhow::Result<WorldProfile> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ProfileFile {
    current: String,
    #[serde(default)]
    pending_selection: String,
    worlds: Vec<WorldProfile>,
}

/// Partial update for [`JsonProfileStore::edit`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub start_command: Option<String>,
    pub requires_elevated_start: Option<bool>,
    pub visible: Option<bool>,
}

/// JSON-file-backed profile collection. A missing or unreadable file is
/// regenerated from the fallback profile; writes go through a temp file and
/// rename so a crash can't leave a half-written store.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
    fallback: WorldProfile,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>, fallback: WorldProfile) -> Self {
        Self {
            path: path.into(),
            fallback,
        }
    }

    async fn load_or_init(&self) -> Result<ProfileFile, LifecycleError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => match serde_json::from_slice::<ProfileFile>(&raw) {
                Ok(file) => Ok(file),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "profile store unreadable, regenerating defaults"
                    );
                    self.init_default().await
                }
            },
            Err(_) => self.init_default().await,
        }
    }

    async fn init_default(&self) -> Result<ProfileFile, LifecycleError> {
        let file = ProfileFile {
            current: self.fallback.name.clone(),
            pending_selection: String::new(),
            worlds: vec![self.fallback.clone()],
        };
        self.save(&file).await?;
        Ok(file)
    }

    async fn save(&self, file: &ProfileFile) -> Result<(), LifecycleError> {
        let result: anyhow::Result<()> = async {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("create profile store dir")?;
            }
            let data = serde_json::to_vec_pretty(file).context("serialize profile store")?;
            let tmp = self.path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &data)
                .await
                .context("write profile store temp file")?;
            tokio::fs::rename(&tmp, &self.path)
                .await
                .context("persist profile store")?;
            Ok(())
        }
        .await;
        result.map_err(|e| LifecycleError::Failed {
            stage: "persist world profiles",
            cause: e,
        })
    }

    pub async fn list(&self) -> Result<Vec<WorldProfile>, LifecycleError> {
        Ok(self.load_or_init().await?.worlds)
    }

    /// The profile the next start command uses.
    pub async fn selected(&self) -> Result<WorldProfile, LifecycleError> {
        let file = self.load_or_init().await?;
        file.worlds
            .iter()
            .find(|w| w.name == file.current)
            .cloned()
            .ok_or_else(|| {
                LifecycleError::user_input(format!("world '{}' not found", file.current))
            })
    }

    pub async fn create(&self, world: WorldProfile) -> Result<(), LifecycleError> {
        let mut file = self.load_or_init().await?;
        if file.worlds.iter().any(|w| w.name == world.name) {
            return Err(LifecycleError::user_input(format!(
                "a world named '{}' already exists",
                world.name
            )));
        }
        file.worlds.push(world);
        self.save(&file).await
    }

    pub async fn edit(&self, name: &str, edit: ProfileEdit) -> Result<WorldProfile, LifecycleError> {
        let mut file = self.load_or_init().await?;
        let Some(idx) = file.worlds.iter().position(|w| w.name == name) else {
            return Err(LifecycleError::user_input(format!("world '{name}' not found")));
        };

        if let Some(new_name) = edit.name.filter(|n| !n.is_empty()) {
            if file.worlds.iter().any(|w| w.name == new_name) && new_name != name {
                return Err(LifecycleError::user_input(format!(
                    "a world named '{new_name}' already exists"
                )));
            }
            if file.current == name {
                file.current = new_name.clone();
            }
            if file.pending_selection == name {
                file.pending_selection = new_name.clone();
            }
            file.worlds[idx].name = new_name;
        }
        if let Some(cmd) = edit.start_command.filter(|c| !c.is_empty()) {
            file.worlds[idx].start_command = cmd;
        }
        if let Some(elevated) = edit.requires_elevated_start {
            file.worlds[idx].requires_elevated_start = elevated;
        }
        if let Some(visible) = edit.visible {
            file.worlds[idx].visible = visible;
        }

        let edited = file.worlds[idx].clone();
        self.save(&file).await?;
        Ok(edited)
    }

    pub async fn delete(&self, name: &str) -> Result<(), LifecycleError> {
        let mut file = self.load_or_init().await?;
        if file.current == name {
            return Err(LifecycleError::user_input(format!(
                "world '{name}' is currently selected and cannot be deleted"
            )));
        }
        let before = file.worlds.len();
        file.worlds.retain(|w| w.name != name);
        if file.worlds.len() == before {
            return Err(LifecycleError::user_input(format!("world '{name}' not found")));
        }
        if file.pending_selection == name {
            file.pending_selection.clear();
        }
        self.save(&file).await
    }

    /// Mark `name` as the next selection. Returns `true` when it already is
    /// the current world (the selection is cleared instead). The switch
    /// itself happens via [`Self::apply_pending`] once the running server is
    /// down, so a selection never yanks the world out from under a live
    /// process.
    pub async fn select(&self, name: &str) -> Result<bool, LifecycleError> {
        let mut file = self.load_or_init().await?;
        if !file.worlds.iter().any(|w| w.name == name) {
            return Err(LifecycleError::user_input(format!("world '{name}' not found")));
        }
        let already_current = file.current == name;
        file.pending_selection = if already_current {
            String::new()
        } else {
            name.to_string()
        };
        self.save(&file).await?;
        Ok(already_current)
    }

    /// Make the pending selection current, if there is one and it is usable.
    pub async fn apply_pending(&self) -> Result<(), LifecycleError> {
        let mut file = self.load_or_init().await?;
        if file.pending_selection.is_empty() || file.pending_selection == file.current {
            return Ok(());
        }
        let usable = file
            .worlds
            .iter()
            .any(|w| w.name == file.pending_selection && w.visible);
        if usable {
            file.current = file.pending_selection.clone();
            file.pending_selection.clear();
            self.save(&file).await?;
        }
        Ok(())
    }
}

impl ProfileSource for JsonProfileStore {
    async fn selected_profile(&self) -> anyhow::Result<WorldProfile> {
        Ok(self.selected().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static STORE_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_store() -> JsonProfileStore {
        let path = std::env::temp_dir().join(format!(
            "warden-profiles-{}-{}.json",
            std::process::id(),
            STORE_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_file(&path);
        JsonProfileStore::new(
            path,
            WorldProfile {
                name: "Main".into(),
                start_command: "./start.sh".into(),
                requires_elevated_start: false,
                visible: true,
            },
        )
    }

    fn world(name: &str) -> WorldProfile {
        WorldProfile {
            name: name.into(),
            start_command: format!("./start-{name}.sh"),
            requires_elevated_start: false,
            visible: true,
        }
    }

    #[tokio::test]
    async fn missing_file_regenerates_the_fallback() {
        let store = scratch_store();
        let selected = store.selected().await.unwrap();
        assert_eq!(selected.name, "Main");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let store = scratch_store();
        store.create(world("Creative")).await.unwrap();
        let err = store.create(world("Creative")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::UserInput(_)));
    }

    #[tokio::test]
    async fn rename_follows_the_current_selection() {
        let store = scratch_store();
        let edited = store
            .edit(
                "Main",
                ProfileEdit {
                    name: Some("Main v2".into()),
                    start_command: Some("./start2.sh".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.name, "Main v2");
        let selected = store.selected().await.unwrap();
        assert_eq!(selected.name, "Main v2");
        assert_eq!(selected.start_command, "./start2.sh");
    }

    #[tokio::test]
    async fn selection_is_two_step() {
        let store = scratch_store();
        store.create(world("Creative")).await.unwrap();

        // Marking a different world pending does not switch yet.
        assert!(!store.select("Creative").await.unwrap());
        assert_eq!(store.selected().await.unwrap().name, "Main");

        store.apply_pending().await.unwrap();
        assert_eq!(store.selected().await.unwrap().name, "Creative");

        // Selecting the current world clears the pending state.
        assert!(store.select("Creative").await.unwrap());
    }

    #[tokio::test]
    async fn hidden_worlds_do_not_become_current() {
        let store = scratch_store();
        let mut hidden = world("Secret");
        hidden.visible = false;
        store.create(hidden).await.unwrap();

        store.select("Secret").await.unwrap();
        store.apply_pending().await.unwrap();
        assert_eq!(store.selected().await.unwrap().name, "Main");
    }

    #[tokio::test]
    async fn the_selected_world_cannot_be_deleted() {
        let store = scratch_store();
        let err = store.delete("Main").await.unwrap_err();
        assert!(matches!(err, LifecycleError::UserInput(_)));

        store.create(world("Creative")).await.unwrap();
        store.delete("Creative").await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_files_regenerate_defaults() {
        let store = scratch_store();
        tokio::fs::write(&store.path, b"not json").await.unwrap();
        let selected = store.selected().await.unwrap();
        assert_eq!(selected.name, "Main");
    }
}
