pub mod box_;
pub mod brush;
pub mod bsp;
pub mod csg;
pub mod error;
pub mod fpoly;
pub mod math;
pub mod model;
pub mod points_grid;
pub mod sphere;
