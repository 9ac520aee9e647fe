pub mod cache;
pub mod confidence;
pub mod db;
pub mod domain;
pub mod error;
pub mod evidence;
pub mod filter;
