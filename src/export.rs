//! The export pipeline: walk, extract, sample, assemble, write.

use animation;
use collada::{self, Content, Fragments};
use config::ExportConfig;
use errors::{Result, Warning, Warnings};
use geometry;
use scene::{ActionId, ImageId, ObjectData, Scene};
use skeleton::Skeleton;
use std::fs;
use std::path::{Path, PathBuf};
use util::atomic_file;
use util::name::FileNameFmt;
use util::UniqueNamer;
use walker::{self, Walk};

/// What a successful export did.
#[derive(Debug)]
pub struct ExportReport {
    /// The documents written, in order.
    pub written: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
}

/// One rendered document, not yet written anywhere.
pub struct RenderedDocument {
    /// The action it was made for, in all-actions mode.
    pub action: Option<ActionId>,
    pub xml: String,
}

/// Export `scene` to `dest`.
///
/// In all-actions mode `dest` only supplies the directory and stem, and one
/// `<stem>-<action>.dae` is written per action. Either every document
/// reaches its final path or none does: if moving one into place fails, the
/// ones already moved are removed again. A file they replaced is not
/// restored.
pub fn export(scene: &Scene, config: &ExportConfig, dest: &Path) -> Result<ExportReport> {
    config.validate(dest)?;
    let timestamp = collada::timestamp(config)?;
    export_with_timestamp(scene, config, dest, &timestamp)
}

/// `export`, with a fixed `<created>`/`<modified>` stamp.
pub fn export_with_timestamp(
    scene: &Scene,
    config: &ExportConfig,
    dest: &Path,
    timestamp: &str,
) -> Result<ExportReport> {
    config.validate(dest)?;
    let mut warnings = Warnings::new();

    let walk = walker::walk(scene, config);
    if walk.is_empty() {
        warnings.push(Warning::EmptySelection);
    }
    let fragments = extract(scene, &walk, config, &mut warnings);
    let documents = render_documents(scene, config, &walk, &fragments, timestamp, &mut warnings)?;

    let action_names: Vec<Option<&str>> = documents.iter()
        .map(|d| d.action.map(|a| scene.actions[a].name.as_str()))
        .collect();
    let paths = output_paths(dest, &action_names);

    // Everything is staged before anything is moved into place, so a failed
    // write can't leave some documents behind.
    let mut staged = Vec::with_capacity(documents.len());
    for (document, path) in documents.iter().zip(&paths) {
        staged.push(atomic_file::stage(path, document.xml.as_bytes())?);
    }
    let mut written = Vec::with_capacity(staged.len());
    for file in staged {
        debug!("writing {}", file.dest().display());
        match file.commit() {
            Ok(path) => written.push(path),
            Err(e) => {
                remove_written(&written);
                return Err(e);
            }
        }
    }

    if config.use_copy_images {
        let dir = dest.parent().unwrap_or_else(|| Path::new(""));
        copy_images(scene, &used_images(scene, &walk, &fragments), dir, &mut warnings);
    }

    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(ExportReport { written, warnings: warnings.into_vec() })
}

/// Extract geometry, skeletons and skins for every exported object, in walk
/// order.
pub fn extract(scene: &Scene, walk: &Walk, config: &ExportConfig, warnings: &mut Warnings) -> Fragments {
    let mut fragments = Fragments::default();

    for node in &walk.nodes {
        let id = node.object;
        match scene.objects[id].data {
            ObjectData::Armature(ref arm) => {
                fragments.skeletons.insert(id, Skeleton::build(arm, config));
            }
            ObjectData::Mesh(ref mesh) => {
                fragments.geometries.insert(id, geometry::extract(scene, id, mesh, config, warnings));
            }
            _ => (),
        }
    }

    // A mesh is skinned when its evaluated modifier stack still deforms it
    // by an exported armature. If the deform was applied, it's baked in.
    for node in &walk.nodes {
        let id = node.object;
        let geom = match fragments.geometries.get(&id) {
            Some(geom) if !geom.vertices.is_empty() => geom,
            _ => continue,
        };
        let arm_id = match geom.mesh.armature() {
            Some(a) => a,
            None => continue,
        };
        let (skel, arm) = match (fragments.skeletons.get(&arm_id), &scene.objects[arm_id].data) {
            (Some(skel), &ObjectData::Armature(ref arm)) => (skel, arm),
            _ => {
                debug!("object {}: armature {} isn't exported; writing it unskinned",
                    scene.objects[id].name, scene.objects[arm_id].name);
                continue;
            }
        };
        let skin = skel.build_skin(
            arm,
            &scene.world_matrix(arm_id),
            &scene.world_matrix(id),
            geom,
            &scene.objects[id].name,
            warnings,
        );
        if let Some(skin) = skin {
            fragments.skins.insert(id, (arm_id, skin));
        }
    }

    fragments
}

/// Render every document of the export to memory.
pub fn render_documents(
    scene: &Scene,
    config: &ExportConfig,
    walk: &Walk,
    fragments: &Fragments,
    timestamp: &str,
    warnings: &mut Warnings,
) -> Result<Vec<RenderedDocument>> {
    let mut documents = vec![];
    for doc_anim in animation::select(scene, walk, config, warnings) {
        let samples = if config.use_anim {
            animation::sample(scene, walk, &fragments.skeletons, &doc_anim.assignment, config, warnings)
        } else {
            vec![]
        };
        let content = Content {
            scene,
            config,
            walk,
            fragments,
            animations: &samples,
            timestamp,
        };
        documents.push(RenderedDocument {
            action: doc_anim.action,
            xml: collada::render(&content)?,
        });
    }
    Ok(documents)
}

/// Undo the commits of a failed export.
fn remove_written(written: &[PathBuf]) {
    for path in written {
        if let Err(e) = fs::remove_file(path) {
            warn!("couldn't remove {} after a failed export: {}", path.display(), e);
        }
    }
}

/// Where each document goes. A document made for an action goes to
/// `<dir>/<stem>-<action>.<ext>`.
fn output_paths(dest: &Path, actions: &[Option<&str>]) -> Vec<PathBuf> {
    let stem = dest.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = dest.extension().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "dae".to_string());
    let mut namer = UniqueNamer::new();
    actions.iter()
        .map(|action| match *action {
            None => dest.to_path_buf(),
            Some(name) => {
                let file_stem = namer.get_fresh_name(format!("{}-{}", stem, FileNameFmt(name)));
                dest.with_file_name(format!("{}.{}", file_stem, ext))
            }
        })
        .collect()
}

/// Images used by the materials of exported meshes, in first-use order.
fn used_images(scene: &Scene, walk: &Walk, fragments: &Fragments) -> Vec<ImageId> {
    let mut images = vec![];
    for node in &walk.nodes {
        let geom = match fragments.geometries.get(&node.object) {
            Some(geom) => geom,
            None => continue,
        };
        for prim in &geom.primitives {
            let image = prim.material.and_then(|m| scene.materials[m].texture);
            if let Some(image) = image {
                if !images.contains(&image) {
                    images.push(image);
                }
            }
        }
    }
    images
}

/// Copy images into `<dir>/images`. Failures are only warnings; the
/// documents are already written.
fn copy_images(scene: &Scene, images: &[ImageId], dir: &Path, warnings: &mut Warnings) {
    if images.is_empty() {
        return;
    }
    let images_dir = dir.join("images");
    if let Err(e) = fs::create_dir_all(&images_dir) {
        for &i in images {
            warnings.push(Warning::ImageCopy { image: scene.images[i].name.clone(), error: e.to_string() });
        }
        return;
    }
    let names = collada::copied_image_names(scene);
    for &i in images {
        let image = &scene.images[i];
        let to = images_dir.join(&names[i]);
        match fs::copy(&image.path, &to) {
            Ok(_) => debug!("copied {} to {}", image.path.display(), to.display()),
            Err(e) => warnings.push(Warning::ImageCopy { image: image.name.clone(), error: e.to_string() }),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use cgmath::{Matrix4, vec3};
    use scene::{
        Action, AnimationData, ArmatureData, Bone, ChannelTarget, FCurve, Image, Keyframe,
        Material, Property, SceneObject,
    };

    fn config() -> ExportConfig {
        let mut config = ExportConfig::default();
        config.use_metadata = false;
        config
    }

    fn rig_scene() -> Scene {
        let mut scene = Scene::new();
        let t = |y| Matrix4::from_translation(vec3(0.0, y, 0.0));
        let mut rig = SceneObject::new("Rig", ObjectData::Armature(ArmatureData {
            bones: vec![
                Bone::new("root", None, t(0.0)),
                Bone::new("ctrl_ik", Some(0), t(1.0)),
                Bone::new("spine", Some(1), t(1.0)),
            ],
        }));
        rig.animation = Some(AnimationData { action: Some("walk".into()) });
        scene.add_object(rig);
        let keys = || vec![Keyframe::linear(1.0, 0.0), Keyframe::linear(10.0, 1.0)];
        for name in &["walk", "walk-noexp"] {
            scene.actions.push(Action {
                name: name.to_string(),
                fcurves: vec![FCurve::new(ChannelTarget::Bone("spine".into()), Property::Location, 0, keys())],
            });
        }
        scene
    }

    #[test]
    fn test_empty_scene_is_written() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.dae");
        let report = export(&Scene::new(), &config(), &dest).unwrap();

        assert_eq!(report.written, vec![dest.clone()]);
        assert_eq!(report.warnings, vec![Warning::EmptySelection]);
        let xml = fs::read_to_string(&dest).unwrap();
        assert!(xml.contains("<library_geometries>"));
        assert!(xml.contains("<library_visual_scenes>"));
    }

    #[test]
    fn test_configuration_error_writes_nothing() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.dae");
        let mut config = config();
        config.anim_optimize_precision = 20.0;
        assert!(export(&Scene::new(), &config, &dest).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_deterministic() {
        let dir = ::tempfile::tempdir().unwrap();
        let mut scene = rig_scene();
        let mut cube = SceneObject::new("Cube", ObjectData::Mesh(::geometry::cube()));
        cube.parent = Some(0);
        scene.add_object(cube);
        let mut config = config();
        config.use_anim = true;

        let a = dir.path().join("a.dae");
        let b = dir.path().join("b.dae");
        export(&scene, &config, &a).unwrap();
        export(&scene, &config, &b).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_cube_triangles() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("cube.dae");
        let mut scene = Scene::new();
        scene.add_object(SceneObject::new("Cube", ObjectData::Mesh(::geometry::cube())));
        let mut config = config();
        config.use_triangles = true;

        let report = export(&scene, &config, &dest).unwrap();
        assert!(report.warnings.is_empty());
        let xml = fs::read_to_string(&dest).unwrap();
        assert_eq!(xml.matches("<geometry ").count(), 1);
        assert!(xml.contains(r#"<triangles count="12">"#));
        assert!(xml.contains(r#"<float_array id="Cube-mesh-positions-array" count="72">"#));
        assert!(!xml.contains("<polylist"));
    }

    #[test]
    fn test_all_actions_skips_noexp() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("rig.dae");
        let mut config = config();
        config.use_anim = true;
        config.use_anim_action_all = true;

        let report = export(&rig_scene(), &config, &dest).unwrap();
        assert_eq!(report.written, vec![dir.path().join("rig-walk.dae")]);
        assert!(!dest.exists());

        let xml = fs::read_to_string(&report.written[0]).unwrap();
        assert!(xml.contains(r#"<animation_clip id="walk" name="walk" start="#));
        assert!(xml.contains(r#"target="spine/transform""#));
        assert!(!xml.contains("ctrl_ik"));
        assert!(!xml.contains("noexp"));
    }

    #[test]
    fn test_one_document_per_action() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("rig.dae");
        let mut config = config();
        config.use_anim = true;
        config.use_anim_action_all = true;
        config.use_anim_skip_noexp = false;

        let report = export(&rig_scene(), &config, &dest).unwrap();
        assert_eq!(report.written, vec![
            dir.path().join("rig-walk.dae"),
            dir.path().join("rig-walk-noexp.dae"),
        ]);
    }

    #[test]
    fn test_failed_commit_removes_earlier_documents() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("rig.dae");
        // The second document's path can't be replaced by a file.
        fs::create_dir(dir.path().join("rig-walk-noexp.dae")).unwrap();
        let mut config = config();
        config.use_anim = true;
        config.use_anim_action_all = true;
        config.use_anim_skip_noexp = false;

        assert!(export(&rig_scene(), &config, &dest).is_err());
        let left: Vec<_> = fs::read_dir(dir.path()).unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, vec!["rig-walk-noexp.dae".to_string()]);
    }

    #[test]
    fn test_same_image_file_names_both_copied() {
        let dir = ::tempfile::tempdir().unwrap();
        let mut scene = Scene::new();
        let mut mesh = ::geometry::cube();
        mesh.materials = vec![Some(0), Some(1)];
        mesh.polygons[0].material = 1;
        for (i, (sub, contents)) in [("a", "AAAA"), ("b", "BBBB")].iter().enumerate() {
            fs::create_dir(dir.path().join(sub)).unwrap();
            let path = dir.path().join(sub).join("tex.png");
            fs::write(&path, contents).unwrap();
            scene.images.push(Image { name: format!("tex-{}", sub), path });
            let mut mat = Material::new(format!("Mat{}", i));
            mat.texture = Some(i);
            scene.materials.push(mat);
        }
        scene.add_object(SceneObject::new("Cube", ObjectData::Mesh(mesh)));
        let mut config = config();
        config.use_copy_images = true;

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let report = export(&scene, &config, &out.join("cube.dae")).unwrap();
        assert!(report.warnings.is_empty());

        let images = out.join("images");
        assert_eq!(fs::read_to_string(images.join("tex.png")).unwrap(), "AAAA");
        assert_eq!(fs::read_to_string(images.join("tex1.png")).unwrap(), "BBBB");
        let xml = fs::read_to_string(out.join("cube.dae")).unwrap();
        assert!(xml.contains("<init_from>images/tex.png</init_from>"));
        assert!(xml.contains("<init_from>images/tex1.png</init_from>"));
    }

    #[test]
    fn test_output_paths_are_unique() {
        let paths = output_paths(Path::new("/out/scene.dae"), &[Some("a/b"), Some("a:b"), Some("")]);
        assert_eq!(paths, vec![
            PathBuf::from("/out/scene-a_b.dae"),
            PathBuf::from("/out/scene-a_b1.dae"),
            PathBuf::from("/out/scene-_.dae"),
        ]);
        assert_eq!(output_paths(Path::new("x.dae"), &[None]), vec![PathBuf::from("x.dae")]);
    }

    #[test]
    fn test_missing_image_is_a_warning() {
        let dir = ::tempfile::tempdir().unwrap();
        let dest = dir.path().join("textured.dae");
        let mut scene = Scene::new();
        let mut mesh = ::geometry::cube();
        mesh.materials = vec![Some(0)];
        let mut mat = Material::new("Mat");
        mat.texture = Some(0);
        scene.materials.push(mat);
        scene.images.push(Image { name: "gone".into(), path: dir.path().join("gone.png") });
        scene.add_object(SceneObject::new("Cube", ObjectData::Mesh(mesh)));
        let mut config = config();
        config.use_copy_images = true;

        let report = export(&scene, &config, &dest).unwrap();
        assert!(dest.exists());
        match report.warnings[..] {
            [Warning::ImageCopy { ref image, .. }] => assert_eq!(image, "gone"),
            _ => panic!("expected one image warning, got {:?}", report.warnings),
        }
    }

    #[test]
    fn test_image_is_copied() {
        let dir = ::tempfile::tempdir().unwrap();
        let src = dir.path().join("wood.png");
        fs::write(&src, b"not really a png").unwrap();
        let mut scene = Scene::new();
        let mut mesh = ::geometry::cube();
        mesh.materials = vec![Some(0)];
        let mut mat = Material::new("Mat");
        mat.texture = Some(0);
        scene.materials.push(mat);
        scene.images.push(Image { name: "wood".into(), path: src });
        scene.add_object(SceneObject::new("Cube", ObjectData::Mesh(mesh)));
        let mut config = config();
        config.use_copy_images = true;

        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let report = export(&scene, &config, &out.join("wood.dae")).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(fs::read(out.join("images").join("wood.png")).unwrap(), b"not really a png");
    }
}
