//! SASL credential encoding for SMTP AUTH.
//!
//! Supports CRAM-MD5 (RFC 2195), DIGEST-MD5 (RFC 2831), PLAIN (RFC 4616)
//! and LOGIN. These functions only build payloads; the session decides
//! when to send them.

use crate::error::{Error, Result};
use crate::types::ReplyCode;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use relaymail_mime::encoding::{decode_base64, encode_base64};

type HmacMd5 = Hmac<Md5>;

/// Service name used in the DIGEST-MD5 `digest-uri`.
pub const DIGEST_SERVICE: &str = "smtp";

/// AUTH PLAIN initial response: base64 of `\0login\0password`.
#[must_use]
pub fn plain_response(login: &str, password: &str) -> String {
    encode_base64(format!("\0{login}\0{password}").as_bytes())
}

/// One AUTH LOGIN step: the username or password, base64-encoded.
#[must_use]
pub fn login_response(value: &str) -> String {
    encode_base64(value.as_bytes())
}

/// Answers a CRAM-MD5 challenge.
///
/// The response is base64 of `login SP hex(HMAC-MD5(password, challenge))`.
///
/// # Errors
///
/// Returns an error if the challenge is not valid base64.
pub fn cram_md5_response(login: &str, password: &str, challenge: &str) -> Result<String> {
    let challenge = decode_challenge(challenge)?;

    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::unexpected(ReplyCode::AUTH_CONTINUE.as_u16(), e.to_string()))?;
    mac.update(&challenge);
    let digest = hex::encode(mac.finalize().into_bytes());

    Ok(encode_base64(format!("{login} {digest}").as_bytes()))
}

/// Answers a DIGEST-MD5 digest-challenge.
///
/// `host` forms the `digest-uri` (`smtp/<host>`) and is the realm fallback
/// when the server sends none. `cnonce` must be unique per attempt.
///
/// # Errors
///
/// Returns an error if the challenge is undecodable, lacks a nonce, or
/// does not offer the `auth` quality of protection.
pub fn digest_md5_response(
    login: &str,
    password: &str,
    challenge: &str,
    host: &str,
    cnonce: &str,
) -> Result<String> {
    let raw = decode_challenge(challenge)?;
    let text = String::from_utf8_lossy(&raw);
    let params = DigestChallenge::parse(&text)?;

    let realm = params.realm.as_deref().unwrap_or(host);
    let digest_uri = format!("{DIGEST_SERVICE}/{host}");
    let response = digest_md5_hash(login, realm, password, &params.nonce, cnonce, &digest_uri);

    let mut answer = String::new();
    if params.utf8 {
        answer.push_str("charset=utf-8,");
    }
    answer.push_str(&format!(
        "username=\"{}\",realm=\"{}\",nonce=\"{}\",nc=00000001,cnonce=\"{}\",digest-uri=\"{}\",response={},qop=auth",
        quote(login),
        quote(realm),
        quote(&params.nonce),
        quote(cnonce),
        quote(&digest_uri),
        response
    ));

    Ok(encode_base64(answer.as_bytes()))
}

/// Computes the RFC 2831 `response` value for `qop=auth` and `nc=00000001`.
fn digest_md5_hash(
    login: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    digest_uri: &str,
) -> String {
    let secret = Md5::digest(format!("{login}:{realm}:{password}").as_bytes());

    let mut a1 = secret.to_vec();
    a1.extend_from_slice(format!(":{nonce}:{cnonce}").as_bytes());
    let ha1 = hex::encode(Md5::digest(&a1));
    let ha2 = hex::encode(Md5::digest(format!("AUTHENTICATE:{digest_uri}").as_bytes()));

    hex::encode(Md5::digest(
        format!("{ha1}:{nonce}:00000001:{cnonce}:auth:{ha2}").as_bytes(),
    ))
}

fn decode_challenge(challenge: &str) -> Result<Vec<u8>> {
    decode_base64(challenge.trim()).map_err(|e| {
        Error::unexpected(
            ReplyCode::AUTH_CONTINUE.as_u16(),
            format!("Undecodable SASL challenge: {e}"),
        )
    })
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// The directives of a DIGEST-MD5 challenge the client needs.
#[derive(Debug, Default, PartialEq, Eq)]
struct DigestChallenge {
    realm: Option<String>,
    nonce: String,
    utf8: bool,
}

impl DigestChallenge {
    fn parse(text: &str) -> Result<Self> {
        let mut challenge = Self::default();
        let mut nonce = None;
        let mut qop_auth = false;
        let mut qop_seen = false;

        for (key, value) in split_directives(text) {
            match key.to_ascii_lowercase().as_str() {
                "realm" if challenge.realm.is_none() => challenge.realm = Some(value),
                "nonce" => nonce = Some(value),
                "charset" => challenge.utf8 = value.eq_ignore_ascii_case("utf-8"),
                "qop" => {
                    qop_seen = true;
                    qop_auth = value.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth"));
                }
                _ => {}
            }
        }

        // A missing qop directive defaults to "auth".
        if qop_seen && !qop_auth {
            return Err(Error::UnsupportedAuthMechanism);
        }
        challenge.nonce = nonce.ok_or_else(|| {
            Error::unexpected(
                ReplyCode::AUTH_CONTINUE.as_u16(),
                "DIGEST-MD5 challenge without nonce",
            )
        })?;

        Ok(challenge)
    }
}

/// Splits `key=value,key="quoted, value"` into pairs.
fn split_directives(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.trim().is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    _ => value.push(c),
                }
            }
            // Skip to the next separator.
            for c in chars.by_ref() {
                if c == ',' {
                    break;
                }
            }
        } else {
            value = chars.by_ref().take_while(|c| *c != ',').collect();
        }

        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }

    pairs
}
