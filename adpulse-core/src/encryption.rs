use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use hex;
use hkdf::Hkdf;
use sha2::Sha256;

/// Encrypt a platform credential blob using AES-256-GCM.
/// Derives a key from the master encryption key and a per-connection scope
/// (e.g. "dropi:42") so credentials never share a key across users.
pub fn encrypt_credentials(plaintext: &str, scope: &str, master_key: &str) -> Result<String> {
    let key = derive_scope_key(master_key, scope)?;

    let cipher = Aes256Gcm::new(&key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    // Combine nonce and ciphertext, then base64 encode
    let mut encrypted_data = nonce.to_vec();
    encrypted_data.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(&encrypted_data))
}

/// Decrypt a credential blob encrypted with [`encrypt_credentials`].
pub fn decrypt_credentials(encrypted: &str, scope: &str, master_key: &str) -> Result<String> {
    let encrypted_data = STANDARD
        .decode(encrypted)
        .map_err(|e| anyhow!("Base64 decode failed: {}", e))?;

    if encrypted_data.len() < 12 {
        return Err(anyhow!("Invalid encrypted data: too short"));
    }

    // Extract nonce (first 12 bytes) and ciphertext
    let nonce = Nonce::from_slice(&encrypted_data[..12]);
    let ciphertext = &encrypted_data[12..];

    let key = derive_scope_key(master_key, scope)?;

    let cipher = Aes256Gcm::new(&key);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("Decryption failed: {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8 after decryption: {}", e))
}

/// Derive a scope-specific encryption key using HKDF.
fn derive_scope_key(master_key: &str, scope: &str) -> Result<Key<Aes256Gcm>> {
    // Decode master key from hex or use directly as bytes
    let master_key_bytes = if master_key.len() == 64 {
        // Assume hex encoding (32 bytes = 64 hex chars)
        hex::decode(master_key).map_err(|e| anyhow!("Invalid hex master key: {}", e))?
    } else {
        // Use as raw bytes (truncate/pad to 32 bytes)
        let mut key_bytes = master_key.as_bytes().to_vec();
        key_bytes.resize(32, 0);
        key_bytes
    };

    let hk = Hkdf::<Sha256>::new(None, &master_key_bytes);
    let mut okm = [0u8; 32];
    hk.expand(scope.as_bytes(), &mut okm)
        .map_err(|e| anyhow!("HKDF expansion failed: {}", e))?;

    Ok(*Key::<Aes256Gcm>::from_slice(&okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let master_key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let scope = "dropi:42";
        let original = r#"{"email":"tienda@example.com","password":"s3cret"}"#;

        let encrypted = encrypt_credentials(original, scope, master_key).unwrap();
        assert_ne!(encrypted, original);

        let decrypted = decrypt_credentials(&encrypted, scope, master_key).unwrap();
        assert_eq!(decrypted, original);
    }

    #[test]
    fn test_wrong_scope_fails() {
        let master_key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let encrypted = encrypt_credentials("secret", "dropi:42", master_key).unwrap();
        assert!(decrypt_credentials(&encrypted, "dropi:43", master_key).is_err());
    }
}
