//! 基础设施层
//!
//! 对象存储、产物/状态存储和 PDF 渲染。上层只依赖这里的 trait 和存储类型。

pub mod artifact_store;
pub mod object_storage;
pub mod renderer;
pub mod state_store;

pub use artifact_store::{ArtifactKind, ArtifactStore};
pub use object_storage::{GcsStorage, LocalStorage, ObjectStorage};
pub use renderer::{default_renderer, DocumentRenderer, UnavailableRenderer};
pub use state_store::StateStore;
