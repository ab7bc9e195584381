pub mod control;
pub mod simulate;
