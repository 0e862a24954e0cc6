use errors::{ErrorKind, Result};
use scene::ObjectKind;
use std::collections::BTreeSet;
use std::path::Path;

/// Every option the exporter understands.
///
/// The defaults are the ones a user gets from the export dialog without
/// touching anything.
#[derive(Clone, Debug)]
pub struct ExportConfig {
    /// Kinds of object to export.
    pub object_types: BTreeSet<ObjectKind>,
    /// Only export selected objects.
    pub use_export_selected: bool,
    /// Apply the modifier stack (to a copy) before extracting geometry.
    pub use_mesh_modifiers: bool,
    /// Leave out Armature modifiers when applying modifiers, so the skin
    /// isn't applied twice.
    pub use_exclude_armature_modifier: bool,
    /// Write TEXTANGENT/TEXBINORMAL arrays.
    pub use_tangent_arrays: bool,
    /// Write `<triangles>` instead of `<polylist>`.
    pub use_triangles: bool,
    /// Copy referenced images into an `images` directory next to the output.
    pub use_copy_images: bool,
    /// Only export objects visible in the active view layer.
    pub use_active_layers: bool,
    /// Prune non-deform bones and bones named with `ctrl_bone_prefix`.
    pub use_exclude_ctrl_bones: bool,
    pub use_anim: bool,
    /// Write one document per action of the first armature.
    pub use_anim_action_all: bool,
    /// Skip actions named with `skip_action_suffix`.
    pub use_anim_skip_noexp: bool,
    /// Drop keyframes that linear interpolation reproduces.
    pub use_anim_optimize: bool,
    /// Keyframes are dropped when they are within `10^-precision` of the
    /// interpolated value. Must lie in [1, 16].
    pub anim_optimize_precision: f64,
    pub use_shape_key_export: bool,
    /// Stamp the document with the real creation time. When off, the epoch
    /// is used so the output only depends on the scene.
    pub use_metadata: bool,
    pub ctrl_bone_prefix: String,
    pub skip_action_suffix: String,
}

impl Default for ExportConfig {
    fn default() -> ExportConfig {
        ExportConfig {
            object_types: all_object_kinds(),
            use_export_selected: false,
            use_mesh_modifiers: false,
            use_exclude_armature_modifier: true,
            use_tangent_arrays: false,
            use_triangles: false,
            use_copy_images: false,
            use_active_layers: true,
            use_exclude_ctrl_bones: true,
            use_anim: false,
            use_anim_action_all: false,
            use_anim_skip_noexp: true,
            use_anim_optimize: true,
            anim_optimize_precision: 6.0,
            use_shape_key_export: false,
            use_metadata: true,
            ctrl_bone_prefix: "ctrl".to_string(),
            skip_action_suffix: "-noexp".to_string(),
        }
    }
}

pub fn all_object_kinds() -> BTreeSet<ObjectKind> {
    use scene::ObjectKind::*;
    [Empty, Camera, Light, Armature, Mesh, Curve].iter().cloned().collect()
}

impl ExportConfig {
    /// Check the options and the destination before doing any work.
    pub fn validate(&self, dest: &Path) -> Result<()> {
        let p = self.anim_optimize_precision;
        if !(p >= 1.0 && p <= 16.0) {
            bail!(ErrorKind::Configuration(format!(
                "anim_optimize_precision must be between 1 and 16, got {}", p
            )));
        }
        if dest.as_os_str().is_empty() {
            bail!(ErrorKind::Configuration("destination path not set".to_string()));
        }
        if dest.is_dir() {
            bail!(ErrorKind::Configuration(format!(
                "destination {} is a directory", dest.display()
            )));
        }
        if dest.file_stem().is_none() {
            bail!(ErrorKind::Configuration(format!(
                "destination {} has no file name", dest.display()
            )));
        }
        match dest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
                bail!(ErrorKind::Configuration(format!(
                    "destination directory {} doesn't exist", dir.display()
                )));
            }
            _ => (),
        }
        Ok(())
    }

    /// Tolerance for keyframe reduction.
    pub fn anim_tolerance(&self) -> f64 {
        10f64.powf(-self.anim_optimize_precision)
    }

    pub fn is_ctrl_bone_name(&self, name: &str) -> bool {
        name.starts_with(self.ctrl_bone_prefix.as_str())
    }

    pub fn is_skipped_action_name(&self, name: &str) -> bool {
        self.use_anim_skip_noexp && name.ends_with(self.skip_action_suffix.as_str())
    }
}

#[test]
fn test_validate_precision() {
    let dir = ::tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.dae");

    let mut config = ExportConfig::default();
    assert!(config.validate(&dest).is_ok());

    config.anim_optimize_precision = 0.5;
    assert!(config.validate(&dest).is_err());
    config.anim_optimize_precision = 17.0;
    assert!(config.validate(&dest).is_err());
    config.anim_optimize_precision = 16.0;
    assert!(config.validate(&dest).is_ok());
}

#[test]
fn test_validate_destination() {
    let dir = ::tempfile::tempdir().unwrap();
    let config = ExportConfig::default();

    assert!(config.validate(Path::new("")).is_err());
    assert!(config.validate(dir.path()).is_err());
    assert!(config.validate(&dir.path().join("missing").join("out.dae")).is_err());

    match config.validate(dir.path()) {
        Err(e) => match *e.kind() {
            ErrorKind::Configuration(_) => (),
            ref k => panic!("wrong error kind: {:?}", k.to_string()),
        },
        Ok(()) => panic!("directory accepted as destination"),
    }
}

#[test]
fn test_name_conventions() {
    let mut config = ExportConfig::default();
    assert!(config.is_ctrl_bone_name("ctrl_ik"));
    assert!(!config.is_ctrl_bone_name("Ctrl_ik"));
    assert!(config.is_skipped_action_name("walk-noexp"));
    assert!(!config.is_skipped_action_name("walk"));
    config.use_anim_skip_noexp = false;
    assert!(!config.is_skipped_action_name("walk-noexp"));
    assert!((config.anim_tolerance() - 1e-6).abs() < 1e-18);
}
