//! HTTP handlers for model CRUD.

pub mod entity;
