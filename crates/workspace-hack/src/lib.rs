// Intentionally empty. This crate exists only to unify feature flags across
// the workspace via `cargo hakari`; see Cargo.toml.
