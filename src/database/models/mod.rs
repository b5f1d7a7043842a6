pub mod course;
pub mod file;
pub mod page;
pub mod scope;

pub use course::CourseVisibility;
pub use file::{FileCourse, FileRecord};
pub use page::Page;
pub use scope::ScopeRow;
