//! Carnet - the core of a French blogging platform
//!
//! Posts with a draft / published / scheduled / archived lifecycle, a
//! background sweep publishing scheduled posts, threaded comments,
//! categories, and registration gated by an emailed verification code.

pub mod clock;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
