pub mod core_record;
pub mod forcing;
pub mod glv;
pub mod membership;
pub mod simulation;
pub mod species;
