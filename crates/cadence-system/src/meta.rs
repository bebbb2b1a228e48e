//! Compile-time identity for systems and pipelines: a zero-sized marker
//! type per system/pipeline implementing these traits stands in for
//! the source's string-literal and pipeline-tag template parameters.

/// Implemented by a zero-sized marker type naming one system.
pub trait SystemMeta {
    const NAME: &'static str;
}

/// Implemented by a zero-sized marker type naming one pipeline.
pub trait PipelineTag {
    const NAME: &'static str;
}
