use crate::domain_port::LedgerError;
use uuid::Uuid;

#[inline]
pub fn uuid_from_bytes(id: &[u8]) -> Result<Uuid, LedgerError> {
    Uuid::from_slice(id).map_err(|e| LedgerError::Store(e.to_string()))
}

#[inline]
pub fn store_err<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Store(e.to_string())
}
