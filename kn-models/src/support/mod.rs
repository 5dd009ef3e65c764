pub mod emit_guard;

pub use emit_guard::EmitGuard;
