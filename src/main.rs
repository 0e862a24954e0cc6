#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate daexport;

use daexport::errors::Result;
use daexport::scene::{self, ObjectKind};
use daexport::{logger, version, ExportConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::exit;

fn main() {
    let app = clap_app!(daexport =>
        (about: "Export a scene description to COLLADA (.dae)")
        (@setting ArgRequiredElseHelp)
        (@arg INPUT: "Scene file (JSON)")
        (@arg OUTPUT: -o --output +takes_value "Output file [default: INPUT with a .dae extension]")
        (@arg verbose: -v --verbose "Log more")
        (@arg quiet: -q --quiet "Only log errors")
        (@arg version: -V --version "Print version info")
        (@arg object_types: --("object-types") +takes_value
            "Comma-separated kinds to export: empty,camera,light,armature,mesh,curve")
        (@arg selected: --selected "Only export selected objects")
        (@arg all_layers: --("all-layers") "Also export hidden objects")
        (@arg apply_modifiers: --("apply-modifiers") "Apply the modifier stack")
        (@arg keep_armature_modifier: --("keep-armature-modifier")
            "Apply Armature modifiers too when applying modifiers")
        (@arg tangents: --tangents "Write tangents and binormals")
        (@arg triangles: --triangles "Triangulate polygons")
        (@arg copy_images: --("copy-images") "Copy textures into an images directory")
        (@arg keep_ctrl_bones: --("keep-ctrl-bones") "Don't prune control and non-deform bones")
        (@arg anim: --anim "Export animation")
        (@arg all_actions: --("all-actions") "Write one file per action of the first armature")
        (@arg keep_noexp: --("keep-noexp") "Don't skip actions marked as not for export")
        (@arg no_optimize: --("no-optimize") "Keep every sampled keyframe")
        (@arg precision: --precision +takes_value "Keyframe reduction precision, 1-16 [default: 6]")
        (@arg shape_keys: --("shape-keys") "Export shape keys as morph controllers")
        (@arg no_metadata: --("no-metadata") "Stamp the epoch instead of the current time")
    );
    let matches = app.get_matches();

    if matches.is_present("version") {
        version::print_version_info();
        return;
    }

    let level = if matches.is_present("quiet") {
        log::Level::Error
    } else if matches.is_present("verbose") {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    logger::init(level);

    if let Err(e) = run(&matches) {
        error!("{}", e);
        for cause in e.iter().skip(1) {
            error!("caused by: {}", cause);
        }
        exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let input = match matches.value_of_os("INPUT") {
        Some(input) => Path::new(input),
        None => return bail_config("no input file"),
    };
    let output = match matches.value_of_os("OUTPUT") {
        Some(output) => PathBuf::from(output),
        None => input.with_extension("dae"),
    };
    let config = config_from_args(matches)?;

    let scene = scene::load::load_file(input)?;
    let report = daexport::export(&scene, &config, &output)?;

    for path in &report.written {
        println!("{}", path.display());
    }
    if !report.warnings.is_empty() {
        info!("finished with {} warnings", report.warnings.len());
    }
    Ok(())
}

fn config_from_args(matches: &clap::ArgMatches) -> Result<ExportConfig> {
    let mut config = ExportConfig::default();

    if let Some(kinds) = matches.value_of("object_types") {
        config.object_types = parse_object_kinds(kinds)?;
    }
    config.use_export_selected = matches.is_present("selected");
    config.use_active_layers = !matches.is_present("all_layers");
    config.use_mesh_modifiers = matches.is_present("apply_modifiers");
    config.use_exclude_armature_modifier = !matches.is_present("keep_armature_modifier");
    config.use_tangent_arrays = matches.is_present("tangents");
    config.use_triangles = matches.is_present("triangles");
    config.use_copy_images = matches.is_present("copy_images");
    config.use_exclude_ctrl_bones = !matches.is_present("keep_ctrl_bones");
    config.use_anim = matches.is_present("anim") || matches.is_present("all_actions");
    config.use_anim_action_all = matches.is_present("all_actions");
    config.use_anim_skip_noexp = !matches.is_present("keep_noexp");
    config.use_anim_optimize = !matches.is_present("no_optimize");
    config.use_shape_key_export = matches.is_present("shape_keys");
    config.use_metadata = !matches.is_present("no_metadata");

    if let Some(p) = matches.value_of("precision") {
        config.anim_optimize_precision = match p.parse() {
            Ok(p) => p,
            Err(_) => return bail_config(&format!("precision isn't a number: {}", p)),
        };
    }

    Ok(config)
}

fn parse_object_kinds(list: &str) -> Result<BTreeSet<ObjectKind>> {
    let mut kinds = BTreeSet::new();
    for s in list.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        kinds.insert(match s {
            "empty" => ObjectKind::Empty,
            "camera" => ObjectKind::Camera,
            "light" => ObjectKind::Light,
            "armature" => ObjectKind::Armature,
            "mesh" => ObjectKind::Mesh,
            "curve" => ObjectKind::Curve,
            _ => return bail_config(&format!("unknown object type: {}", s)),
        });
    }
    Ok(kinds)
}

fn bail_config<T>(msg: &str) -> Result<T> {
    Err(daexport::ErrorKind::Configuration(msg.to_string()).into())
}
