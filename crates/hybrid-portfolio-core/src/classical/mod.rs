pub mod integer_lp;
pub mod mean_variance;
pub mod refiner;
