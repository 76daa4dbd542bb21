// Market data module entrypoint
pub mod adapters; // venue-specific request targets + parsers
pub mod gateway; // wires an instrument to its worker pair
pub mod types; // normalized snapshot/trade value types
pub mod worker; // per-instrument polling loops
