pub mod eligibility;
pub mod lifecycle;
pub mod models;
pub mod service;
