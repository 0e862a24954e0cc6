//! More-or-less general-purpose utility functions.

pub mod atomic_file;
pub mod ins_set;
pub mod make_invertible;
pub mod name;
pub mod namers;

pub use self::ins_set::InsOrderSet;
pub use self::namers::UniqueNamer;
