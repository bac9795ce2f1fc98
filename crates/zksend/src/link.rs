//! Claim link codec.
//!
//! A link is `{host}{path}[?redirect_url=..&name=..]#{token}`. The token is
//! the base64 secret key of the link keypair, prefixed with `$` for escrow
//! links. Only the token carries key material; host, path and redirect are
//! routing hints and never affect which key a token decodes to.

use std::fmt;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use sui_sdk_types::Address;
use url::Url;

use crate::error::{Result, ZkSendError};
use crate::keypair::Keypair;

pub const DEFAULT_HOST: &str = "https://zksend.com";
pub const DEFAULT_PATH: &str = "/claim";
pub const REDIRECT_URL_PARAM: &str = "redirect_url";
pub const REDIRECT_NAME_PARAM: &str = "name";

const ESCROW_DISCRIMINATOR: char = '$';
const SECRET_KEY_LENGTH: usize = 32;

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How the assets behind a link are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkVariant {
    /// Assets are owned directly by the link address.
    Direct,
    /// Assets sit in a zk_bag escrow keyed by the link address.
    Escrow,
}

impl LinkVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkVariant::Direct => "direct",
            LinkVariant::Escrow => "escrow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRedirect {
    pub url: String,
    pub name: String,
}

/// Where a link points. Has no bearing on the key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRouting {
    pub host: String,
    pub path: String,
    pub redirect: Option<LinkRedirect>,
}

impl LinkRouting {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            host,
            path,
            redirect: None,
        }
    }

    pub fn with_redirect(mut self, url: impl Into<String>, name: impl Into<String>) -> Self {
        self.redirect = Some(LinkRedirect {
            url: url.into(),
            name: name.into(),
        });
        self
    }
}

impl Default for LinkRouting {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PATH)
    }
}

/// URL fragment identifying a link.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LinkToken(String);

impl LinkToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LinkToken(..)")
    }
}

pub fn encode(keypair: &Keypair, variant: LinkVariant) -> LinkToken {
    let body = STANDARD.encode(keypair.secret_bytes());
    LinkToken(match variant {
        LinkVariant::Direct => body,
        LinkVariant::Escrow => format!("{ESCROW_DISCRIMINATOR}{body}"),
    })
}

/// Decodes a token into the link keypair and variant. Accepts standard or
/// URL-safe base64, padded or not.
pub fn decode(token: &str) -> Result<(Keypair, LinkVariant)> {
    let first = token
        .chars()
        .next()
        .ok_or_else(|| ZkSendError::MalformedToken("empty token".to_string()))?;

    let (variant, body) = match first {
        ESCROW_DISCRIMINATOR => (LinkVariant::Escrow, &token[ESCROW_DISCRIMINATOR.len_utf8()..]),
        c if is_base64_symbol(c) => (LinkVariant::Direct, token),
        other => return Err(ZkSendError::UnknownVariant(other)),
    };

    let engine = if body.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };
    let bytes = engine
        .decode(body)
        .map_err(|e| ZkSendError::MalformedToken(format!("invalid base64: {e}")))?;
    let secret: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
        ZkSendError::MalformedToken(format!(
            "expected {SECRET_KEY_LENGTH} secret key bytes, found {}",
            bytes.len()
        ))
    })?;

    Ok((Keypair::from_secret_bytes(secret), variant))
}

fn is_base64_symbol(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '-' | '_')
}

/// A decoded (or freshly generated) claim link.
#[derive(Debug, Clone)]
pub struct ClaimLink {
    keypair: Keypair,
    variant: LinkVariant,
    routing: LinkRouting,
}

impl ClaimLink {
    pub fn new(keypair: Keypair, variant: LinkVariant, routing: LinkRouting) -> Self {
        Self {
            keypair,
            variant,
            routing,
        }
    }

    pub fn generate(variant: LinkVariant, routing: LinkRouting) -> Result<Self> {
        Ok(Self::new(Keypair::generate()?, variant, routing))
    }

    pub fn from_token(token: &str, routing: LinkRouting) -> Result<Self> {
        let (keypair, variant) = decode(token)?;
        Ok(Self::new(keypair, variant, routing))
    }

    /// Parses a full link URL. The routing is taken from the URL itself, so a
    /// link minted under one host still opens under another.
    pub fn from_url(link: &str) -> Result<Self> {
        let parsed = Url::parse(link.trim())
            .map_err(|e| ZkSendError::MalformedToken(format!("invalid link url: {e}")))?;
        let token = parsed
            .fragment()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ZkSendError::MalformedToken("link url has no fragment".to_string()))?;

        let mut redirect_url = None;
        let mut redirect_name = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                REDIRECT_URL_PARAM => redirect_url = Some(value.into_owned()),
                REDIRECT_NAME_PARAM => redirect_name = Some(value.into_owned()),
                _ => {}
            }
        }

        let routing = LinkRouting {
            host: parsed.origin().ascii_serialization(),
            path: parsed.path().to_string(),
            redirect: match (redirect_url, redirect_name) {
                (Some(url), Some(name)) => Some(LinkRedirect { url, name }),
                _ => None,
            },
        };
        Self::from_token(token, routing)
    }

    pub fn url(&self) -> Result<String> {
        let mut url = Url::parse(&self.routing.host)
            .map_err(|e| ZkSendError::InvalidUrl(format!("{}: {e}", self.routing.host)))?;
        url.set_path(&self.routing.path);
        if let Some(redirect) = &self.routing.redirect {
            url.query_pairs_mut()
                .append_pair(REDIRECT_URL_PARAM, &redirect.url)
                .append_pair(REDIRECT_NAME_PARAM, &redirect.name);
        }
        url.set_fragment(Some(self.token().as_str()));
        Ok(url.into())
    }

    pub fn token(&self) -> LinkToken {
        encode(&self.keypair, self.variant)
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn variant(&self) -> LinkVariant {
        self.variant
    }

    pub fn routing(&self) -> &LinkRouting {
        &self.routing
    }

    pub fn require_variant(&self, expected: LinkVariant) -> Result<&Self> {
        if self.variant != expected {
            return Err(ZkSendError::VariantMismatch {
                expected,
                actual: self.variant,
            });
        }
        Ok(self)
    }
}
