//! Enumerations stored as validated string tokens.
//!
//! The stored token is the GraphQL value name, so a value written through the
//! API reads back unchanged.

use async_graphql::Enum;

/// An enum persisted as one of a fixed set of string tokens
pub trait StoredEnum: Sized + Copy + 'static {
    const TOKENS: &'static [(&'static str, Self)];

    fn as_str(&self) -> &'static str;

    fn from_token(token: &str) -> Option<Self> {
        Self::TOKENS
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, v)| *v)
    }
}

/// Resolve a stored token to its enum value.
///
/// Unknown tokens resolve to `None` instead of failing, so rows written by a
/// newer or older schema still load. The leniency is deliberate; each miss is
/// logged so bad data stays visible.
pub fn resolve_enum<E: StoredEnum>(stored: Option<&str>) -> Option<E> {
    let token = stored?;
    let value = E::from_token(token);
    if value.is_none() {
        tracing::warn!(
            token,
            enum_type = std::any::type_name::<E>(),
            "Ignoring unrecognized enum token"
        );
    }
    value
}

macro_rules! stored_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $token:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Enum, Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[graphql(name = $token)]
                $variant,
            )+
        }

        impl StoredEnum for $name {
            const TOKENS: &'static [(&'static str, Self)] = &[$(($token, $name::$variant)),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }
        }
    };
}

stored_enum! {
    GenderEnum {
        Male => "MALE",
        Female => "FEMALE",
        TransgenderMale => "TRANSGENDER_MALE",
        TransgenderFemale => "TRANSGENDER_FEMALE",
        Intersex => "INTERSEX",
    }
}

stored_enum! {
    EthnicityEnum {
        Caucasian => "CAUCASIAN",
        Black => "BLACK",
        Asian => "ASIAN",
        Indian => "INDIAN",
        Latin => "LATIN",
        MiddleEastern => "MIDDLE_EASTERN",
        Mixed => "MIXED",
        Other => "OTHER",
    }
}

stored_enum! {
    EyeColorEnum {
        Blue => "BLUE",
        Brown => "BROWN",
        Grey => "GREY",
        Green => "GREEN",
        Hazel => "HAZEL",
        Red => "RED",
    }
}

stored_enum! {
    HairColorEnum {
        Blonde => "BLONDE",
        Brunette => "BRUNETTE",
        Black => "BLACK",
        Red => "RED",
        Auburn => "AUBURN",
        Grey => "GREY",
        Bald => "BALD",
        Various => "VARIOUS",
        Other => "OTHER",
    }
}

stored_enum! {
    BreastTypeEnum {
        Natural => "NATURAL",
        Fake => "FAKE",
        Na => "NA",
    }
}

stored_enum! {
    DateAccuracyEnum {
        Year => "YEAR",
        Month => "MONTH",
        Day => "DAY",
    }
}

stored_enum! {
    /// Purpose of a pending activation record
    PendingActivationType {
        NewUser => "newUser",
        ResetPassword => "resetPassword",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        for (token, value) in GenderEnum::TOKENS {
            assert_eq!(value.as_str(), *token);
            assert_eq!(GenderEnum::from_token(token), Some(*value));
        }
    }

    #[test]
    fn unknown_tokens_resolve_to_none() {
        assert_eq!(resolve_enum::<EyeColorEnum>(Some("PURPLE")), None);
        assert_eq!(resolve_enum::<EyeColorEnum>(Some("blue")), None);
        assert_eq!(resolve_enum::<EyeColorEnum>(None), None);
        assert_eq!(
            resolve_enum::<EyeColorEnum>(Some("HAZEL")),
            Some(EyeColorEnum::Hazel)
        );
    }

    #[test]
    fn activation_types_use_camel_case_tokens() {
        assert_eq!(PendingActivationType::ResetPassword.as_str(), "resetPassword");
        assert_eq!(
            PendingActivationType::from_token("newUser"),
            Some(PendingActivationType::NewUser)
        );
    }

    #[test]
    fn graphql_names_match_stored_tokens() {
        use async_graphql::{InputType, Name, Value};

        for (token, value) in BreastTypeEnum::TOKENS {
            assert_eq!(value.to_value(), Value::Enum(Name::new(token)));
        }
        for (token, value) in DateAccuracyEnum::TOKENS {
            assert_eq!(value.to_value(), Value::Enum(Name::new(token)));
        }
    }
}
