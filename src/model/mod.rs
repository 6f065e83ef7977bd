// Farm and Animal records

mod animal;
mod farm;
mod validation;

pub use animal::{Animal, AnimalStatus, AnimalView};
pub use farm::Farm;
pub use validation::ValidationError;
