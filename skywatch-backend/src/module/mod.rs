pub mod passes;
pub mod result_cache;
pub mod scheduled;
pub mod track;
