// Copyright 2023 Simo Sorce
// See LICENSE.txt file for terms

use std::error;
use std::fmt;

use crate::pkcs11::vendor::SKS_RV_NOT_FOUND;
use crate::pkcs11::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    origin: Option<Box<dyn error::Error + Send + Sync>>,
    errmsg: Option<String>,
    ckrv: CK_RV,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum ErrorKind {
    /* A Cryptoki-style error, see ckrv Error field */
    CkError,
    /* The attribute or stored item was not found, see errmsg */
    NotFound,
    /* Other error, see origin */
    Nested,
}

impl Error {
    pub fn ck_rv(ckrv: CK_RV) -> Error {
        Error {
            kind: ErrorKind::CkError,
            origin: None,
            errmsg: None,
            ckrv: ckrv,
        }
    }

    pub fn ck_rv_from_error<E>(ckrv: CK_RV, error: E) -> Error
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error {
            kind: ErrorKind::CkError,
            origin: Some(error.into()),
            errmsg: None,
            ckrv: ckrv,
        }
    }

    pub fn ck_rv_with_errmsg(ckrv: CK_RV, errmsg: String) -> Error {
        Error {
            kind: ErrorKind::CkError,
            origin: None,
            errmsg: Some(errmsg),
            ckrv: ckrv,
        }
    }

    pub fn not_found(errmsg: String) -> Error {
        Error {
            kind: ErrorKind::NotFound,
            origin: None,
            errmsg: Some(errmsg),
            ckrv: SKS_RV_NOT_FOUND,
        }
    }

    pub fn other_error<E>(error: E) -> Error
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error {
            kind: ErrorKind::Nested,
            origin: Some(error.into()),
            errmsg: None,
            ckrv: CKR_GENERAL_ERROR,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn rv(&self) -> CK_RV {
        self.ckrv
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::CkError => {
                if let Some(ref e) = self.errmsg {
                    write!(f, "{}", e)
                } else if let Some(ref e) = self.origin {
                    write!(f, "rv 0x{:x}: {}", self.ckrv, e)
                } else {
                    write!(f, "rv 0x{:x}", self.ckrv)
                }
            }
            ErrorKind::NotFound => match self.errmsg {
                Some(ref e) => write!(f, "not found: {}", e),
                None => write!(f, "not found"),
            },
            ErrorKind::Nested => match self.origin {
                Some(ref e) => e.fmt(f),
                None => write!(f, "rv 0x{:x}", self.ckrv),
            },
        }
    }
}

impl error::Error for Error {}

impl From<CK_RV> for Error {
    fn from(ckrv: CK_RV) -> Error {
        Error::ck_rv(ckrv)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        if error.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(error.to_string())
        } else {
            Error::other_error(error)
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(error: std::num::TryFromIntError) -> Error {
        Error::ck_rv_from_error(CKR_ARGUMENTS_BAD, error)
    }
}

impl From<asn1::ParseError> for Error {
    fn from(error: asn1::ParseError) -> Error {
        Error::ck_rv_with_errmsg(CKR_ATTRIBUTE_VALUE_INVALID, error.to_string())
    }
}

impl From<asn1::WriteError> for Error {
    fn from(_: asn1::WriteError) -> Error {
        Error::ck_rv(CKR_GENERAL_ERROR)
    }
}

/// Maps a crypto backend failure to a general error while keeping the
/// origin for tracing
pub fn device_error<E>(error: E) -> Error
where
    E: Into<Box<dyn error::Error + Send + Sync>>,
{
    Error::ck_rv_from_error(CKR_GENERAL_ERROR, error)
}

#[macro_export]
macro_rules! err_rv {
    ($ck_err:expr) => {
        Err($crate::error::Error::ck_rv($ck_err))
    };
}

#[macro_export]
macro_rules! err_not_found {
    ($err_str:expr) => {
        Err($crate::error::Error::not_found($err_str))
    };
}

#[macro_export]
macro_rules! to_rv {
    ($ck_err:expr) => {
        $crate::error::Error::ck_rv($ck_err)
    };
}
