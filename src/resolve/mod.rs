//! Include target resolution: reference grammar, source access, and loading.

pub mod reference;
pub mod resolver;
pub mod source;

pub use reference::{ActionReference, IncludeKind};
pub use resolver::{Resolved, Resolver};
pub use source::{
    CachingFetcher, FileSystem, LocalFileSystem, MemoryFetcher, MemoryFileSystem, MirrorFetcher,
    OfflineFetcher, SourceFetcher,
};
