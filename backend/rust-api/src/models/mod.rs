pub mod card;
pub mod session;
pub mod sprint;
pub mod stats;
pub mod track;
