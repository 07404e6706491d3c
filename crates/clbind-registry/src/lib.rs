//! Package, function and class registration.
//!
//! The [`PackageRegistry`] is the binding context. Native code registers a
//! package with a callback that receives a [`PackageBuilder`]:
//!
//! ```ignore
//! registry.register_package("geometry", |pkg| {
//!     pkg.defun("distance", |x: f64, y: f64| (x * x + y * y).sqrt())?;
//!     pkg.defclass::<Point>("point")?
//!         .slot::<f64>("x")?
//!         .slot::<f64>("y")?
//!         .constructor("make-point", |x: f64, y: f64| Point { x, y })?
//!         .method("point-norm", |p: &Point| (p.x * p.x + p.y * p.y).sqrt())?
//!         .build()?;
//!     Ok(())
//! })?;
//! ```

mod class;
mod config;
mod function;
mod package;
mod registry;

pub use class::{ClassBuilder, IntoMethod, IntoMethodMut, define_class};
pub use config::BindingConfig;
pub use function::{FunctionFlags, FunctionWrapper};
pub use package::{Package, PackageBuilder};
pub use registry::PackageRegistry;
