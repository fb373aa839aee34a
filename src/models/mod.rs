pub mod entity;
pub mod progress;

// Re-export commonly used items
pub use entity::{Collection, Entity, Member, Resource, ResourceType};
pub use progress::{ProgressTermination, TransferHandle, TransferProgress, INDETERMINATE};
