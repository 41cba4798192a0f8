pub mod auth;
pub mod backgrounds;
pub mod backup;
pub mod certificate_pickups;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod letters;
pub mod school_profile;
pub mod spp_payments;
pub mod student_cards;
pub mod student_transfers;
pub mod students;
pub mod teachers;
pub mod users;
