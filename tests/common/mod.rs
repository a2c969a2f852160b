pub mod fakes;
pub mod strategies;

#[allow(unused_imports)]
pub use fakes::*;
#[allow(unused_imports)]
pub use strategies::*;
