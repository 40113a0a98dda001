//! edmacro - Embeddable macro VM for text editors
//!
//! This crate re-exports all layers of the edmacro system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 4: edmacro_runtime     - Host session: scheduling, safe collection
//!          edmacro_stdlib      - Built-in string and number routines
//! Layer 3: edmacro_debug       - Tracing of macro runs
//! Layer 2: edmacro_language    - Symbol table, program builder, bytecode VM
//! Layer 1: edmacro_storage     - Strings, sparse arrays, garbage collection
//! Layer 0: edmacro_foundation  - Core types (Value, handles, Error)
//! ```

pub use edmacro_debug as debug;
pub use edmacro_foundation as foundation;
pub use edmacro_language as language;
pub use edmacro_runtime as runtime;
pub use edmacro_stdlib as stdlib;
pub use edmacro_storage as storage;
