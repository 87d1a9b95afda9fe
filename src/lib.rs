pub mod card;
pub mod review;
pub mod scheduler;
pub mod stats;
pub mod web;
