//! Maps [`fpd_app::AppError`] onto JSON-RPC error codes.

use fpd_app::AppError;
use jsonrpsee::types::error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use jsonrpsee::types::ErrorObjectOwned;

/// Custom error code for an attempt to act on a provider that has already
/// been slashed (`SLASHED` is terminal).
const SLASHED_ERROR_CODE: i32 = -32001;

pub(crate) fn map_app_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::UnknownProvider(_) => ErrorObjectOwned::owned(INVALID_PARAMS_CODE, err.to_string(), None::<()>),
        AppError::AlreadyRunning(_) => ErrorObjectOwned::owned(INVALID_PARAMS_CODE, err.to_string(), None::<()>),
        AppError::Slashed(_) => ErrorObjectOwned::owned(SLASHED_ERROR_CODE, err.to_string(), None::<()>),
        AppError::Store(_) | AppError::Signer(_) | AppError::Chain(_) | AppError::Core(_) => {
            ErrorObjectOwned::owned(INTERNAL_ERROR_CODE, err.to_string(), None::<()>)
        }
    }
}
