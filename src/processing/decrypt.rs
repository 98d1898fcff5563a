//! Decrypt operations: mp4decrypt (legacy and modern key shapes) and the fallback tool

use super::kid::rewrite_key_ids;
use super::runner::{Tool, ToolRunner, os_args};
use crate::error::Result;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

/// Key id the legacy scheme's single key is bound to
const LEGACY_KEY_ID: &str = "1";

/// `--key 1:<key>`
pub fn legacy_key_args(key: &str) -> Vec<OsString> {
    os_args(["--key".to_string(), format!("{LEGACY_KEY_ID}:{key}")])
}

/// `--key 0…01:<key> --key 0…00:<default key>`, paired with the key-id rewrite
pub fn modern_key_args(key: &str, default_key: &str) -> Vec<OsString> {
    let content_kid = format!("{}1", "0".repeat(31));
    let default_kid = "0".repeat(32);
    os_args([
        "--key".to_string(),
        format!("{content_kid}:{key}"),
        "--key".to_string(),
        format!("{default_kid}:{default_key}"),
    ])
}

/// Runs decrypt tools for one item
#[derive(Clone)]
pub struct Decryptor {
    runner: Arc<dyn ToolRunner>,
    default_key: String,
}

impl Decryptor {
    /// Create a decryptor; `default_key` pairs with the all-zero key id
    pub fn new(runner: Arc<dyn ToolRunner>, default_key: impl Into<String>) -> Self {
        Self {
            runner,
            default_key: default_key.into(),
        }
    }

    /// mp4decrypt with the legacy single-key shape
    pub async fn mp4decrypt_legacy(&self, input: &Path, output: &Path, key: &str) -> Result<()> {
        let mut args = legacy_key_args(key);
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());
        self.runner.run(Tool::Mp4Decrypt, args).await?;
        Ok(())
    }

    /// Rewrite key ids in `input`, then mp4decrypt with the sequential key pair
    pub async fn mp4decrypt_modern(&self, input: &Path, output: &Path, key: &str) -> Result<()> {
        rewrite_key_ids(input).await?;

        let mut args = modern_key_args(key, &self.default_key);
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());
        self.runner.run(Tool::Mp4Decrypt, args).await?;
        Ok(())
    }

    /// Opaque fallback decrypt
    pub async fn amdecrypt(
        &self,
        input: &Path,
        output: &Path,
        media_id: &str,
        fallback_key: &str,
    ) -> Result<()> {
        let args = os_args([
            OsString::from("-i"),
            input.as_os_str().to_owned(),
            OsString::from("-o"),
            output.as_os_str().to_owned(),
            OsString::from("-id"),
            OsString::from(media_id),
            OsString::from("-key"),
            OsString::from(fallback_key),
        ]);
        self.runner.run(Tool::AmDecrypt, args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_legacy_key_shape() {
        assert_eq!(
            strings(&legacy_key_args("abcdef")),
            vec!["--key", "1:abcdef"]
        );
    }

    #[test]
    fn test_modern_key_shape() {
        assert_eq!(
            strings(&modern_key_args("abcdef", "32b8ade1769e26b1ffb8986352793fc6")),
            vec![
                "--key",
                "00000000000000000000000000000001:abcdef",
                "--key",
                "00000000000000000000000000000000:32b8ade1769e26b1ffb8986352793fc6",
            ]
        );
    }
}
