pub mod item_loader;

pub use item_loader::load_items;
