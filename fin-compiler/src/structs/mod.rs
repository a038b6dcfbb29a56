//! Struct and interface lowering: mode classification, MONO template
//! instantiation, ERASED/STANDARD two-pass lowering, field flattening for
//! inheritance, interface fat pointers, dispatch, and member access.

pub mod dispatch;
pub mod lowering;
pub mod member_access;
pub mod mode;
pub mod mono;

pub use lowering::{declare_struct_shape, lower_struct_bodies};
pub use member_access::compile_member_access;
pub use mode::classify_mode;
