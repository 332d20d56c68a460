//! Repository query functions organized by table.

pub mod evidence;
pub mod info;
