pub mod content;
pub mod db;

pub use content::load_content;
pub use db::DbAdapter;
