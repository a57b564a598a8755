//! Re-encrypts linked credential tokens that are still stored as plaintext.
//!
//! Rows already in the encrypted format are left untouched, so the tool can be rerun safely.

use anyhow::{Context, Result, anyhow};
use adgate::{
    config::ConfigLoader,
    crypto::{CryptoKey, encrypt_token, is_encrypted_payload},
    db,
    models::linked_credential,
};
use clap::Parser;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

#[derive(Debug, Parser)]
#[command(name = "reencrypt_credentials", about = "Encrypt legacy plaintext credential tokens")]
struct Args {
    /// Report the rows that would change without writing them
    #[arg(long)]
    dry_run: bool,
}

fn seal_legacy(key: &CryptoKey, principal_id: uuid::Uuid, stored: &[u8]) -> Result<Option<Vec<u8>>> {
    if stored.is_empty() || is_encrypted_payload(stored) {
        return Ok(None);
    }
    let plaintext = std::str::from_utf8(stored)
        .with_context(|| format!("plaintext token for {} is not UTF-8", principal_id))?;
    let sealed = encrypt_token(key, principal_id, plaintext)
        .map_err(|err| anyhow!("failed to encrypt token for {}: {}", principal_id, err))?;
    Ok(Some(sealed))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ConfigLoader::new().load().context("loading configuration")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    let credentials = linked_credential::Entity::find()
        .all(&db)
        .await
        .context("querying linked credentials")?;

    let mut updated_count = 0usize;

    for credential in credentials {
        let principal_id = credential.principal_id;

        let new_access = seal_legacy(&crypto_key, principal_id, &credential.access_token_ciphertext)?;
        let new_refresh = match credential.refresh_token_ciphertext.as_deref() {
            Some(refresh) => seal_legacy(&crypto_key, principal_id, refresh)?,
            None => None,
        };

        if new_access.is_none() && new_refresh.is_none() {
            continue;
        }
        updated_count += 1;

        if args.dry_run {
            println!("would re-encrypt tokens for principal {}", principal_id);
            continue;
        }

        // updated_at is left alone: it is the refresh compare-and-set token
        let mut active: linked_credential::ActiveModel = credential.into();
        if let Some(cipher) = new_access {
            active.access_token_ciphertext = Set(cipher);
        }
        if let Some(cipher) = new_refresh {
            active.refresh_token_ciphertext = Set(Some(cipher));
        }

        active
            .update(&db)
            .await
            .with_context(|| format!("updating credential for {}", principal_id))?;
    }

    if args.dry_run {
        println!("{} credential(s) contain legacy plaintext tokens.", updated_count);
    } else {
        println!(
            "Re-encrypted {} credential(s) containing legacy plaintext tokens.",
            updated_count
        );
    }

    Ok(())
}
