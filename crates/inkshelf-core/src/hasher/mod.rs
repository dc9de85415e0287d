pub mod fingerprint;

pub use fingerprint::compute_fingerprint;
