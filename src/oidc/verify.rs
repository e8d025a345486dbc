//! Signature and claim checks for ID tokens.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, Header, Validation,
	errors::{Error as JwtError, ErrorKind as JwtErrorKind},
	jwk::{Jwk, JwkSet, PublicKeyUse},
};
// self
use crate::{_prelude::*, error::ProtocolError, oidc::IdTokenClaims};

/// Per-token expectations derived from the client config and the login flow.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClaimChecks<'a> {
	pub(crate) issuer: &'a str,
	/// `None` disables the audience check.
	pub(crate) client_id: Option<&'a str>,
	pub(crate) expected_nonce: &'a str,
	pub(crate) leeway: StdDuration,
}

/// Parses the JOSE header and rejects algorithms outside `allowed` and every `HS*` variant.
pub(crate) fn parse_header(raw: &str, allowed: &[Algorithm]) -> Result<Header, ProtocolError> {
	let header = jsonwebtoken::decode_header(raw)
		.map_err(|e| ProtocolError::MalformedIdToken { reason: e.to_string() })?;

	if is_symmetric(header.alg) || !allowed.contains(&header.alg) {
		return Err(ProtocolError::UnsupportedAlgorithm { algorithm: format!("{:?}", header.alg) });
	}

	Ok(header)
}

/// Picks the verification key for `kid`.
///
/// Tokens without a `kid` are accepted only when the set holds exactly one signing key.
pub(crate) fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk, ProtocolError> {
	let unknown = || ProtocolError::UnknownSigningKey { kid: kid.map(str::to_owned) };

	match kid {
		Some(kid) => keys.find(kid).filter(|jwk| is_signing_key(jwk)).ok_or_else(unknown),
		None => {
			let mut signing = keys.keys.iter().filter(|jwk| is_signing_key(jwk));

			match (signing.next(), signing.next()) {
				(Some(jwk), None) => Ok(jwk),
				_ => Err(unknown()),
			}
		},
	}
}

/// Verifies the signature with `jwk` and checks `iss`, `aud`, `exp`, `nbf`, and `nonce`.
pub(crate) fn verify_claims(
	raw: &str,
	header: &Header,
	jwk: &Jwk,
	checks: ClaimChecks<'_>,
) -> Result<IdTokenClaims, ProtocolError> {
	let key = DecodingKey::from_jwk(jwk)
		.map_err(|_| ProtocolError::UnknownSigningKey { kid: header.kid.clone() })?;
	let mut validation = Validation::new(header.alg);

	validation.leeway = checks.leeway.as_secs();
	validation.validate_nbf = true;
	validation.set_issuer(&[checks.issuer]);
	validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

	match checks.client_id {
		Some(client_id) => validation.set_audience(&[client_id]),
		None => validation.validate_aud = false,
	}

	let claims = jsonwebtoken::decode::<IdTokenClaims>(raw, &key, &validation)
		.map_err(|e| map_jwt_error(header, e))?
		.claims;

	match claims.nonce.as_deref() {
		None => Err(ProtocolError::MissingClaim { claim: "nonce".into() }),
		Some(nonce) if nonce != checks.expected_nonce => Err(ProtocolError::NonceMismatch),
		Some(_) => Ok(claims),
	}
}

fn map_jwt_error(header: &Header, err: JwtError) -> ProtocolError {
	match err.kind() {
		JwtErrorKind::InvalidSignature => ProtocolError::InvalidSignature,
		JwtErrorKind::InvalidIssuer => ProtocolError::IssuerMismatch,
		JwtErrorKind::InvalidAudience => ProtocolError::AudienceMismatch,
		JwtErrorKind::ExpiredSignature => ProtocolError::Expired,
		JwtErrorKind::ImmatureSignature => ProtocolError::NotYetValid,
		JwtErrorKind::MissingRequiredClaim(claim) =>
			ProtocolError::MissingClaim { claim: claim.clone() },
		JwtErrorKind::InvalidAlgorithm =>
			ProtocolError::UnsupportedAlgorithm { algorithm: format!("{:?}", header.alg) },
		JwtErrorKind::InvalidRsaKey(_) | JwtErrorKind::InvalidKeyFormat =>
			ProtocolError::UnknownSigningKey { kid: header.kid.clone() },
		_ => ProtocolError::MalformedIdToken { reason: err.to_string() },
	}
}

fn is_symmetric(alg: Algorithm) -> bool {
	matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn is_signing_key(jwk: &Jwk) -> bool {
	!matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::{EncodingKey, encode};
	use serde_json::json;
	// self
	use super::*;

	const KEY_1_PEM: &str = include_str!("../../tests/support/rsa_key_1.pem");
	const KEY_1_JWK: &str = include_str!("../../tests/support/rsa_key_1.jwk.json");
	const KEY_2_JWK: &str = include_str!("../../tests/support/rsa_key_2.jwk.json");
	const ISSUER: &str = "https://accounts.google.com";

	fn jwks(jwks: &[&str]) -> JwkSet {
		let keys = jwks
			.iter()
			.map(|raw| serde_json::from_str(raw).expect("JWK fixture should parse."))
			.collect();

		JwkSet { keys }
	}

	fn sign(claims: serde_json::Value, kid: Option<&str>) -> String {
		let mut header = Header::new(Algorithm::RS256);

		header.kid = kid.map(str::to_owned);

		let key = EncodingKey::from_rsa_pem(KEY_1_PEM.as_bytes()).expect("PEM should load.");

		encode(&header, &claims, &key).expect("Token should sign.")
	}

	fn claims() -> serde_json::Value {
		let now = OffsetDateTime::now_utc().unix_timestamp();

		json!({
			"iss": ISSUER,
			"sub": "user-1",
			"aud": "client-1",
			"exp": now + 300,
			"iat": now,
			"nonce": "nonce-1",
			"email": "user@example.com",
		})
	}

	fn checks() -> ClaimChecks<'static> {
		ClaimChecks {
			issuer: ISSUER,
			client_id: Some("client-1"),
			expected_nonce: "nonce-1",
			leeway: StdDuration::from_secs(0),
		}
	}

	fn verify(raw: &str, checks: ClaimChecks<'_>) -> Result<IdTokenClaims, ProtocolError> {
		let header = parse_header(raw, &[Algorithm::RS256])?;
		let keys = jwks(&[KEY_1_JWK, KEY_2_JWK]);
		let jwk = select_key(&keys, header.kid.as_deref())?;

		verify_claims(raw, &header, jwk, checks)
	}

	#[test]
	fn accepts_valid_token() {
		let claims = verify(&sign(claims(), Some("key-1")), checks()).expect("Token should verify.");

		assert_eq!(claims.sub, "user-1");
		assert_eq!(claims.email(), Some("user@example.com"));
	}

	#[test]
	fn rejects_nonce_mismatch_even_with_valid_signature() {
		let mut body = claims();

		body["nonce"] = json!("replayed");

		assert!(matches!(
			verify(&sign(body, Some("key-1")), checks()),
			Err(ProtocolError::NonceMismatch)
		));

		let mut body = claims();

		body.as_object_mut().expect("Claims are an object.").remove("nonce");

		assert!(matches!(
			verify(&sign(body, Some("key-1")), checks()),
			Err(ProtocolError::MissingClaim { ref claim }) if claim == "nonce"
		));
	}

	#[test]
	fn rejects_standard_claim_failures() {
		let mut body = claims();

		body["iss"] = json!("https://evil.example");

		assert!(matches!(
			verify(&sign(body, Some("key-1")), checks()),
			Err(ProtocolError::IssuerMismatch)
		));

		let mut body = claims();

		body["aud"] = json!(["someone-else"]);

		assert!(matches!(
			verify(&sign(body.clone(), Some("key-1")), checks()),
			Err(ProtocolError::AudienceMismatch)
		));
		verify(&sign(body, Some("key-1")), ClaimChecks { client_id: None, ..checks() })
			.expect("Audience check can be skipped.");

		let mut body = claims();

		body["exp"] = json!(OffsetDateTime::now_utc().unix_timestamp() - 600);

		assert!(matches!(
			verify(&sign(body, Some("key-1")), checks()),
			Err(ProtocolError::Expired)
		));
	}

	#[test]
	fn rejects_wrong_key_and_unknown_kid() {
		// Signed by key 1 but labelled as key 2.
		assert!(matches!(
			verify(&sign(claims(), Some("key-2")), checks()),
			Err(ProtocolError::InvalidSignature)
		));
		assert!(matches!(
			verify(&sign(claims(), Some("key-9")), checks()),
			Err(ProtocolError::UnknownSigningKey { kid: Some(_) })
		));
		// Two candidate keys and no kid.
		assert!(matches!(
			verify(&sign(claims(), None), checks()),
			Err(ProtocolError::UnknownSigningKey { kid: None })
		));
	}

	#[test]
	fn rejects_disallowed_and_symmetric_algorithms() {
		let hs = encode(
			&Header::new(Algorithm::HS256),
			&claims(),
			&EncodingKey::from_secret(b"shared"),
		)
		.expect("Token should sign.");

		assert!(matches!(
			parse_header(&hs, &[Algorithm::RS256, Algorithm::HS256]),
			Err(ProtocolError::UnsupportedAlgorithm { .. })
		));

		let rs = sign(claims(), Some("key-1"));

		assert!(matches!(
			parse_header(&rs, &[Algorithm::ES256]),
			Err(ProtocolError::UnsupportedAlgorithm { .. })
		));
		assert!(matches!(
			parse_header("not-a-jwt", &[Algorithm::RS256]),
			Err(ProtocolError::MalformedIdToken { .. })
		));
	}
}
