pub mod cipher;
pub mod keys;
pub mod kx;
pub mod random;
pub mod signature;
pub mod suite;
