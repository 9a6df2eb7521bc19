use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

/// The identity bundle the embedding host attaches to every handshake. Parsed,
/// never verified here; verification belongs to the host platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub asset_id: String,
    pub visitor_id: i64,
    pub url_slug: String,
    pub interactive_nonce: String,
    pub interactive_public_key: String,
    pub scene_drop_id: String,
    pub identity_id: String,
    pub profile_id: String,
    pub unique_name: String,
    pub username: String,
    pub display_name: String,
}

impl Credentials {
    /// Pure parse of a query/handshake map. Fails loudly on the first missing
    /// field; `visitorId` is cast to an integer.
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, CredentialsError> {
        let required = |key: &'static str| -> Result<String, CredentialsError> {
            query
                .get(key)
                .map(|value| value.to_string())
                .ok_or(CredentialsError::Missing(key))
        };

        let raw_visitor = required("visitorId")?;
        let visitor_id = raw_visitor
            .parse::<i64>()
            .map_err(|_| CredentialsError::MalformedVisitorId(raw_visitor))?;

        Ok(Self {
            asset_id: required("assetId")?,
            visitor_id,
            url_slug: required("urlSlug")?,
            interactive_nonce: required("interactiveNonce")?,
            interactive_public_key: required("interactivePublicKey")?,
            scene_drop_id: required("sceneDropId")?,
            identity_id: required("identityId")?,
            profile_id: required("profileId")?,
            unique_name: required("uniqueName")?,
            username: required("username")?,
            display_name: required("displayName")?,
        })
    }

    /// Session key derived from the visitor id.
    pub fn session_id(&self) -> u64 {
        self.visitor_id as u64
    }
}

#[derive(Debug, PartialEq)]
pub enum CredentialsError {
    Missing(&'static str),
    MalformedVisitorId(String),
}

impl Display for CredentialsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsError::Missing(key) => {
                write!(f, "missing required credential field `{key}`")
            }
            CredentialsError::MalformedVisitorId(raw) => {
                write!(f, "visitorId must be an integer, got `{raw}`")
            }
        }
    }
}

impl Error for CredentialsError {}
