//! Payment gateway adapters
//!
//! Two concerns live here: creating gateway orders (a pass-through to the
//! gateway API) and verifying the payment proof a client returns after
//! checkout. Verification is a local HMAC check and never touches the network.
//!
//! The verifier knows nothing about artifacts. A valid proof for any order
//! unlocks whatever artifact id accompanies it; the order is not bound to the
//! id it was paid for.

mod razorpay;

pub use razorpay::RazorpayGateway;

use crate::error::{Error, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Currency all orders are created in
pub const ORDER_CURRENCY: &str = "INR";

/// Proof of payment returned by the checkout flow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntitlementProof {
    /// Gateway order identifier
    pub order_id: String,
    /// Gateway payment identifier
    pub payment_id: String,
    /// Hex HMAC-SHA256 over `order_id|payment_id`
    pub signature: String,
}

/// Creates orders on the payment gateway
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Create an order for `amount` (smallest currency unit) and return the
    /// gateway's order object unchanged.
    async fn create_order(&self, amount: u64) -> Result<Value>;
}

/// Checks payment signatures with the gateway key secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Create a verifier for the given key secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> Result<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("Unusable gateway secret: {e}")))?;
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Ok(mac)
    }

    /// Signature the gateway issues for a payment
    pub fn sign(&self, order_id: &str, payment_id: &str) -> Result<String> {
        let mac = self.mac(order_id, payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a payment proof in constant time.
    ///
    /// Only the exact lowercase hex form the gateway issues is accepted.
    pub fn verify(&self, proof: &EntitlementProof) -> Result<()> {
        if !is_lowercase_hex(&proof.signature) {
            return Err(Error::SignatureInvalid);
        }
        let claimed = hex::decode(&proof.signature).map_err(|_| Error::SignatureInvalid)?;
        self.mac(&proof.order_id, &proof.payment_id)?
            .verify_slice(&claimed)
            .map_err(|_| Error::SignatureInvalid)
    }
}

fn is_lowercase_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(verifier: &SignatureVerifier) -> EntitlementProof {
        EntitlementProof {
            order_id: "order_Nx1".to_string(),
            payment_id: "pay_Qz9".to_string(),
            signature: verifier.sign("order_Nx1", "pay_Qz9").unwrap(),
        }
    }

    #[test]
    fn only_exact_lowercase_signature_is_accepted() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("order_1", "pay_1").unwrap();
        assert_eq!(signature.len(), 64);

        let with_signature = |signature: String| EntitlementProof {
            order_id: "order_1".into(),
            payment_id: "pay_1".into(),
            signature,
        };

        assert!(verifier.verify(&with_signature(signature.clone())).is_ok());
        for variant in [
            signature.to_uppercase(),
            format!(" {signature} "),
            format!("{signature}\n"),
        ] {
            assert!(matches!(
                verifier.verify(&with_signature(variant)),
                Err(Error::SignatureInvalid)
            ));
        }
    }

    #[test]
    fn verification_is_idempotent() {
        let verifier = SignatureVerifier::new("key_secret");
        let proof = proof(&verifier);
        assert!(verifier.verify(&proof).is_ok());
        assert!(verifier.verify(&proof).is_ok());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let verifier = SignatureVerifier::new("key_secret");
        let mut proof = proof(&verifier);
        let last = proof.signature.pop().unwrap();
        proof.signature.push(if last == '0' { '1' } else { '0' });

        assert!(matches!(
            verifier.verify(&proof),
            Err(Error::SignatureInvalid)
        ));
    }

    #[test]
    fn swapped_ids_and_garbage_are_rejected() {
        let verifier = SignatureVerifier::new("key_secret");
        let good = proof(&verifier);

        let swapped = EntitlementProof {
            order_id: good.payment_id.clone(),
            payment_id: good.order_id.clone(),
            signature: good.signature.clone(),
        };
        assert!(verifier.verify(&swapped).is_err());

        let garbage = EntitlementProof {
            signature: "not-hex".to_string(),
            ..good.clone()
        };
        assert!(verifier.verify(&garbage).is_err());

        let other_secret = SignatureVerifier::new("different");
        assert!(other_secret.verify(&good).is_err());
    }
}
