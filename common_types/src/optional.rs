//   Copyright 2024 The Tari Project
//   SPDX-License-Identifier: BSD-3-Clause

/// Implemented by error types that have a "not found" case, allowing callers
/// to decide whether absence is exceptional at a given call site.
pub trait IsNotFoundError {
    fn is_not_found_error(&self) -> bool;
}

/// Converts a `Result<T, E>` into `Result<Option<T>, E>`, mapping the
/// not-found case to `Ok(None)`.
pub trait Optional {
    type Item;
    type Error;

    fn optional(self) -> Result<Option<Self::Item>, Self::Error>;
}

impl<T, E: IsNotFoundError> Optional for Result<T, E> {
    type Error = E;
    type Item = T;

    fn optional(self) -> Result<Option<T>, E> {
        match self {
            Ok(item) => Ok(Some(item)),
            Err(err) if err.is_not_found_error() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
