use std::fmt;

error_chain! {
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        TimeFmt(::time::ParseError);
        Json(::json::Error);
        Persist(::tempfile::PersistError);
    }

    errors {
        // Raised before any work is done.
        Configuration(msg: String) {
            description("invalid export configuration")
            display("invalid export configuration: {}", msg)
        }
        // Malformed scene snapshot (eg. a cyclic bone hierarchy).
        InvalidScene(msg: String) {
            description("invalid scene")
            display("invalid scene: {}", msg)
        }
    }
}

macro_rules! check {
    ($b:expr) => {
        if !$b {
            use errors::Error;
            use errors::ErrorKind;
            Err(Error::from_kind(ErrorKind::Msg(format!(
                "expected: {}",
                stringify!($b)
            ))))
        } else {
            Ok(())
        }
    };
}

/// Non-fatal problems found during an export. These never cause partial
/// output; they're collected and handed back with the `ExportReport` after
/// the documents have been written.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// No objects survived the filters. The document is still written, it's
    /// just empty.
    EmptySelection,
    /// A mesh that produced no faces, or a skin where every influencing bone
    /// was pruned.
    DegenerateGeometry { object: String, reason: &'static str },
    /// An action that couldn't be sampled (usually: no keyframes).
    AnimationSource { action: String, reason: &'static str },
    /// An image that should have been copied next to the output wasn't.
    ImageCopy { image: String, error: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Warning::EmptySelection =>
                write!(f, "no objects matched the export filters; wrote an empty document"),
            Warning::DegenerateGeometry { ref object, reason } =>
                write!(f, "object {}: {}", object, reason),
            Warning::AnimationSource { ref action, reason } if action.is_empty() =>
                write!(f, "{}", reason),
            Warning::AnimationSource { ref action, reason } =>
                write!(f, "action {}: {}", action, reason),
            Warning::ImageCopy { ref image, ref error } =>
                write!(f, "couldn't copy image {}: {}", image, error),
        }
    }
}

/// Collects warnings, logging each one as it arrives.
#[derive(Default)]
pub struct Warnings {
    list: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Warnings {
        Warnings { list: vec![] }
    }

    pub fn push(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.list.push(warning);
    }

    pub fn extend(&mut self, other: Warnings) {
        self.list.extend(other.list);
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.list
    }
}
