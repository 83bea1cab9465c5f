mod db;

pub use db::FingerprintCache;
