//! Function lowering: the module-level declare/compile two-pass driver,
//! the struct-method/operator/constructor/destructor compile entry points,
//! and MONO generic function instantiation.

pub mod lowering;
pub mod mono;

pub use lowering::{compile_instantiated_function, declare_pass, compile_pass};
pub use mono::instantiate_function;
