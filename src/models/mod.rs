mod entity;
mod entity_kind;
mod farming;
mod mint;
mod record;
mod sync_status;
mod task_item;
mod todo;

pub use entity::Entity;
pub use entity_kind::EntityKind;
pub use farming::FarmingProject;
pub use mint::Mint;
pub use record::{LocalId, RecordPatch, SyncRecord};
pub use sync_status::SyncStatus;
pub use task_item::TaskItem;
pub use todo::{Priority, TodoTask};
