//! Field-by-field transformation of CSV artifacts.
//!
//! Rows and field boundaries are kept; every non-empty field is replaced by
//! its ciphertext (or plaintext) and empty fields pass through. Blank lines
//! come out as empty rows. Output uses CRLF row terminators and quotes a
//! field only when it needs it.

use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Terminator, WriterBuilder};
use tracing::{debug, instrument};

use super::cipher::{CipherError, FieldCipher};
use super::error::DecryptError;

fn transform<F>(input: &[u8], mut field: F) -> Result<(Vec<u8>, usize), CipherError>
where
    F: FnMut(&[u8]) -> Result<Vec<u8>, CipherError>,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut builder = WriterBuilder::new();
    builder.flexible(true).terminator(Terminator::CRLF);
    let mut writer = builder.from_writer(Vec::with_capacity(input.len()));

    let mut transformed = 0;
    let mut consumed = 0;
    let mut record = ByteRecord::new();
    let mut output = ByteRecord::new();
    loop {
        // The reader drops blank lines; put them back as empty rows.
        let blanks = blank_lines(input, consumed);
        if blanks > 0 {
            let mut buf = writer
                .into_inner()
                .map_err(|e| CipherError::Csv(e.into_error().into()))?;
            for _ in 0..blanks {
                buf.extend_from_slice(b"\r\n");
            }
            writer = builder.from_writer(buf);
        }

        if !reader.read_byte_record(&mut record)? {
            break;
        }
        consumed = usize::try_from(reader.position().byte()).map_or(input.len(), |end| end.min(input.len()));

        output.clear();
        for value in &record {
            if value.is_empty() {
                output.push_field(b"");
            } else {
                output.push_field(&field(value)?);
                transformed += 1;
            }
        }
        writer.write_byte_record(&output)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CipherError::Csv(e.into_error().into()))?;
    Ok((bytes, transformed))
}

/// Counts the blank lines between offset `from` and the next record.
///
/// A record ending in `\r\n` is handed back after its `\r`; the `\n` that
/// follows still belongs to it.
fn blank_lines(input: &[u8], from: usize) -> usize {
    let rest = &input[from..];
    let run = rest
        .iter()
        .take_while(|&&b| matches!(b, b'\r' | b'\n'))
        .count();
    let mut gap = &rest[..run];
    if from > 0 && input[from - 1] == b'\r' {
        gap = gap.strip_prefix(b"\n").unwrap_or(gap);
    }

    let mut count = 0;
    while let [b'\r', b'\n', tail @ ..] | [_, tail @ ..] = gap {
        gap = tail;
        count += 1;
    }
    count
}

/// Enciphers every non-empty field of a CSV document.
///
/// # Errors
///
/// Returns [`CipherError::Csv`] if the input is not readable as CSV.
pub fn encrypt_csv(input: &[u8], cipher: &FieldCipher) -> Result<Vec<u8>, CipherError> {
    let (bytes, _) = transform(input, |value| Ok(cipher.encrypt_field(value).into_bytes()))?;
    Ok(bytes)
}

/// Deciphers every non-empty field of a CSV document.
///
/// The key is accepted only if every non-empty field decodes, unpads and
/// yields UTF-8, and at least one field was deciphered.
///
/// # Errors
///
/// Returns [`CipherError`] on the first field that fails, or
/// [`CipherError::Empty`] if there was nothing to decipher.
pub fn decrypt_csv(input: &[u8], cipher: &FieldCipher) -> Result<Vec<u8>, CipherError> {
    let (bytes, deciphered) =
        transform(input, |value| Ok(cipher.decrypt_field(value)?.into_bytes()))?;
    if deciphered == 0 {
        return Err(CipherError::Empty);
    }
    Ok(bytes)
}

/// Enciphers the CSV file at `input` into `output`.
///
/// # Errors
///
/// Returns [`DecryptError`] if either file cannot be accessed or the input is
/// not CSV.
#[instrument(skip(cipher))]
pub async fn encrypt_file(input: &Path, output: &Path, cipher: &FieldCipher) -> Result<(), DecryptError> {
    let plaintext = tokio::fs::read(input)
        .await
        .map_err(|e| DecryptError::io(input, e))?;
    let ciphertext = encrypt_csv(&plaintext, cipher)?;
    write_output(output, &ciphertext).await?;
    debug!(bytes = ciphertext.len(), "encrypted");
    Ok(())
}

/// Writes `bytes` to `path`, creating parent directories.
pub(crate) async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), DecryptError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DecryptError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| DecryptError::io(path, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Name,Age,City,Salary,Notes\r\n\
        John Doe,30,New York,50000,Senior Developer\r\n\
        María García,28,Madrid,45000,Contains ñ and á\r\n\
        ,,,,\r\n\
        \"Special \"\"Chars\"\"\",40,\"Boston,MA\",80000,\"Quotes, commas & symbols!@#$%\"\r\n\
        \"Multi\nLine\",32,Chicago,55000,\"Contains\nnewline characters\"\r\n";

    fn rows(bytes: &[u8]) -> Vec<Vec<String>> {
        ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes)
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_round_trip_is_byte_exact() {
        let cipher = FieldCipher::from_credential("MySecKey");
        let encrypted = encrypt_csv(SAMPLE.as_bytes(), &cipher).unwrap();
        let decrypted = decrypt_csv(&encrypted, &cipher).unwrap();
        assert_eq!(String::from_utf8(decrypted).unwrap(), SAMPLE);
    }

    #[test]
    fn test_encryption_keeps_shape_and_empty_fields() {
        let cipher = FieldCipher::from_credential("MySecKey");
        let encrypted = encrypt_csv(SAMPLE.as_bytes(), &cipher).unwrap();

        let plain = rows(SAMPLE.as_bytes());
        let sealed = rows(&encrypted);
        assert_eq!(plain.len(), sealed.len());
        for (p, s) in plain.iter().zip(&sealed) {
            assert_eq!(p.len(), s.len());
            for (pf, sf) in p.iter().zip(s) {
                assert_eq!(pf.is_empty(), sf.is_empty());
                if !pf.is_empty() {
                    assert_ne!(pf, sf);
                }
            }
        }
        assert_eq!(sealed[3], vec![""; 5]);
    }

    #[test]
    fn test_ragged_rows_survive() {
        let cipher = FieldCipher::from_credential("k");
        let input = "a\r\nb,c,d\r\ne,f\r\n";
        let encrypted = encrypt_csv(input.as_bytes(), &cipher).unwrap();
        assert_eq!(decrypt_csv(&encrypted, &cipher).unwrap(), input.as_bytes());
    }

    #[test]
    fn test_blank_rows_survive_round_trip() {
        let cipher = FieldCipher::from_credential("MySecKey");
        let input = "a,b\r\n\r\nc,d\r\n\r\n";
        let encrypted = encrypt_csv(input.as_bytes(), &cipher).unwrap();
        assert_eq!(encrypted.windows(4).filter(|w| w == b"\r\n\r\n").count(), 2);
        assert_eq!(decrypt_csv(&encrypted, &cipher).unwrap(), input.as_bytes());
    }

    #[test]
    fn test_blank_row_in_foreign_ciphertext_is_kept() {
        let cipher = FieldCipher::from_credential("Secr3tK");
        let x = cipher.encrypt_field(b"x");
        let y = cipher.encrypt_field(b"y");
        let sealed = format!("{x}\r\n\r\n{y}\r\n");
        assert_eq!(decrypt_csv(sealed.as_bytes(), &cipher).unwrap(), b"x\r\n\r\ny\r\n");
    }

    #[test]
    fn test_blank_lines_are_counted_per_terminator() {
        assert_eq!(blank_lines(b"\r\n\r\na", 0), 2);
        assert_eq!(blank_lines(b"a\r\nb", 2), 0);
        assert_eq!(blank_lines(b"a\r\n\n\rb", 2), 2);
        assert_eq!(blank_lines(b"a\n\nb", 2), 1);
        assert_eq!(blank_lines(b"a", 1), 0);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let encrypted =
            encrypt_csv(SAMPLE.as_bytes(), &FieldCipher::from_credential("rightkey")).unwrap();
        assert!(decrypt_csv(&encrypted, &FieldCipher::from_credential("wrongkey")).is_err());
    }

    #[test]
    fn test_plaintext_table_is_rejected() {
        let cipher = FieldCipher::from_credential("MySecKey");
        assert!(decrypt_csv(SAMPLE.as_bytes(), &cipher).is_err());
    }

    #[test]
    fn test_nothing_to_decrypt() {
        let cipher = FieldCipher::from_credential("MySecKey");
        assert!(encrypt_csv(b"", &cipher).unwrap().is_empty());
        assert!(matches!(decrypt_csv(b"", &cipher), Err(CipherError::Empty)));
        assert!(matches!(decrypt_csv(b",,\r\n", &cipher), Err(CipherError::Empty)));
    }

    #[tokio::test]
    async fn test_encrypt_file_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("plain.csv");
        let output = dir.path().join("out").join("sealed.csv");
        std::fs::write(&input, "a,b\r\n").unwrap();

        let cipher = FieldCipher::from_credential("MySecKey");
        encrypt_file(&input, &output, &cipher).await.unwrap();

        let sealed = std::fs::read(&output).unwrap();
        assert_eq!(decrypt_csv(&sealed, &cipher).unwrap(), b"a,b\r\n");
    }
}
