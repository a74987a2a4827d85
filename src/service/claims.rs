//! Identity attributes pulled out of a provider's verified userinfo claims.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::entities::accounts::Provider;

const AVATAR_BASE_URL: &str = "https://ui-avatars.com/api/";
const GOOGLE_FALLBACK_NAME: &str = "Google User";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("assertion has no usable {0} claim")]
    MissingClaim(&'static str),
    #[error("provider reports the email as unverified")]
    UnverifiedEmail,
}

/// Claims handed over by the identity provider once its handshake succeeded.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct IdentityAssertion(HashMap<String, Value>);

impl IdentityAssertion {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    fn nonempty(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn email_verified(&self) -> Option<bool> {
        match self.0.get("email_verified")? {
            Value::Bool(flag) => Some(*flag),
            Value::String(flag) => flag.parse().ok(),
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for IdentityAssertion {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub provider: Provider,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub subject: String,
}

impl FederatedIdentity {
    pub fn from_assertion(
        provider: Provider,
        assertion: &IdentityAssertion,
    ) -> Result<Self, ClaimsError> {
        let email = assertion
            .nonempty("email")
            .ok_or(ClaimsError::MissingClaim("email"))?
            .to_string();
        if assertion.email_verified() == Some(false) {
            return Err(ClaimsError::UnverifiedEmail);
        }
        let subject = assertion
            .nonempty("sub")
            .ok_or(ClaimsError::MissingClaim("sub"))?
            .to_string();

        Ok(Self {
            provider,
            email,
            name: assertion.nonempty("name").map(str::to_string),
            picture: assertion.nonempty("picture").map(str::to_string),
            subject,
        })
    }

    pub fn full_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| GOOGLE_FALLBACK_NAME.to_string())
    }

    /// The provider's picture, or a generated initials avatar.
    pub fn avatar_url(&self) -> String {
        if let Some(picture) = &self.picture {
            return picture.clone();
        }
        let name = self
            .name
            .as_deref()
            .unwrap_or("User")
            .split_whitespace()
            .map(|word| urlencoding::encode(word).into_owned())
            .collect::<Vec<_>>()
            .join("+");
        format!("{}?name={}&background=random", AVATAR_BASE_URL, name)
    }
}
