pub mod output;
pub mod terminal;
