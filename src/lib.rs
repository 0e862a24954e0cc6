//! Exports a scene graph (meshes, armatures, shape keys, cameras, lights,
//! curves and their animation) to COLLADA 1.4.1 documents.
//!
//! The usual entry point is `export`; `scene::load` reads a scene from
//! its JSON description.

#![recursion_limit = "1024"] // for error_chain

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
extern crate atty;
extern crate cgmath;
extern crate json;
extern crate petgraph;
extern crate smallvec;
extern crate tempfile;
extern crate termcolor;
extern crate time;

#[macro_use]
pub mod errors;
pub mod util;
pub mod scene;
pub mod config;
pub mod ids;
pub mod walker;
pub mod geometry;
pub mod skeleton;
pub mod animation;
pub mod collada;
pub mod export;
pub mod logger;
pub mod version;

pub use config::ExportConfig;
pub use errors::{Error, ErrorKind, Result, Warning};
pub use export::{export, ExportReport};
