// src/services/password.rs

use bcrypt::{hash, verify};

use crate::common::error::AppError;

// Política mínima de senha. O algoritmo de hash em si fica a cargo do bcrypt.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> Result<(), AppError> {
        if password.chars().count() < self.min_length {
            return Err(AppError::WeakPassword(format!(
                "a senha deve ter no mínimo {} caracteres",
                self.min_length
            )));
        }
        if password.trim().is_empty() {
            return Err(AppError::WeakPassword("a senha não pode ser só espaços".into()));
        }

        let has_letter = password.chars().any(char::is_alphabetic);
        let has_digit_or_symbol = password.chars().any(|c| !c.is_alphabetic() && !c.is_whitespace());
        if !has_letter || !has_digit_or_symbol {
            return Err(AppError::WeakPassword(
                "a senha deve misturar letras com números ou símbolos".into(),
            ));
        }
        Ok(())
    }
}

// bcrypt é CPU-bound: roda fora do executor assíncrono
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password_clone = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(&password_clone, cost))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;
    Ok(hashed)
}

// A comparação do bcrypt é em tempo constante
pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let password_clone = password.to_owned();
    let password_hash_clone = password_hash.to_owned();
    let is_valid = tokio::task::spawn_blocking(move || verify(&password_clone, &password_hash_clone))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;
    Ok(is_valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PasswordPolicy {
        PasswordPolicy { min_length: 8 }
    }

    #[test]
    fn rejects_short_and_single_class_passwords() {
        assert!(matches!(policy().check("ab1"), Err(AppError::WeakPassword(_))));
        assert!(matches!(policy().check("abcdefghij"), Err(AppError::WeakPassword(_))));
        assert!(matches!(policy().check("1234567890"), Err(AppError::WeakPassword(_))));
        assert!(policy().check("viagem2024").is_ok());
        assert!(policy().check("pass phrase!").is_ok());
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let hashed = hash_password("viagem2024", 4).await.unwrap();
        assert!(verify_password("viagem2024", &hashed).await.unwrap());
        assert!(!verify_password("viagem2025", &hashed).await.unwrap());
    }
}
