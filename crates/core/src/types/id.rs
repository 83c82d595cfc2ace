//! Newtype IDs for type-safe entity references.
//!
//! Every row in the backend is keyed by a UUID. The `define_id!` macro wraps
//! that UUID so a `WalletId` can never be passed where a `ProductId` is
//! expected.

/// Macro to define a type-safe UUID wrapper.
///
/// Creates a newtype wrapper around [`uuid::Uuid`] with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `random()`, `as_uuid()`
/// - `Display` and `FromStr` using the hyphenated UUID form
///
/// # Example
///
/// ```rust
/// # use hwmarket_core::define_id;
/// define_id!(ListingId);
/// define_id!(BuyerId);
///
/// let listing = ListingId::random();
/// let parsed: ListingId = listing.to_string().parse().unwrap();
/// assert_eq!(listing, parsed);
///
/// // These are different types, so this won't compile:
/// // let _: BuyerId = listing;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random (v4) ID.
            #[must_use]
            pub fn random() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Backend row identifiers
define_id!(UserId);
define_id!(ProductId);
define_id!(AddressId);
define_id!(PaymentMethodId);
define_id!(WalletId);
define_id!(TransactionId);
define_id!(BankAccountId);
define_id!(NotificationId);
define_id!(FavoriteId);
define_id!(ReportId);

/// Client-generated key that lets the server deduplicate a retried request.
///
/// Unlike row IDs this is never read back from the database, so it is kept
/// separate from the `define_id!` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(uuid::Uuid);

impl IdempotencyKey {
    /// Generate a new key.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_round_trip() {
        let id = WalletId::random();
        let parsed: WalletId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<ProductId>().is_err());
    }

    #[test]
    fn test_serde_is_transparent() {
        let uuid = uuid::Uuid::new_v4();
        let id = UserId::new(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn test_idempotency_keys_are_unique() {
        assert_ne!(IdempotencyKey::generate(), IdempotencyKey::generate());
    }
}
