//! Bridge integration tests: fabric → dispatcher → HTTP(S) → mock ePO.

mod lifecycle;
mod scenarios;
mod tls;
mod transport;
