// Fixed-width record codec.
//
// Every row occupies exactly ROW_SIZE bytes on a page: a u32 id followed by
// two NUL-terminated text fields of fixed capacity. The on-page layout is the
// in-memory layout; there is no per-row header.

/// Maximum number of data bytes in a username (excluding the terminator).
pub const USERNAME_MAX_LENGTH: usize = 32;
/// Maximum number of data bytes in an email (excluding the terminator).
pub const EMAIL_MAX_LENGTH: usize = 255;

pub const ID_SIZE: usize = 4;
pub const USERNAME_SIZE: usize = USERNAME_MAX_LENGTH + 1;
pub const EMAIL_SIZE: usize = EMAIL_MAX_LENGTH + 1;

pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// Total serialized size of a row: 4 + 33 + 256 = 293 bytes.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// A single table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    pub fn new(id: u32, username: &str, email: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            email: email.to_string(),
        }
    }

    /// Write the row into a ROW_SIZE byte frame. Text fields are copied up
    /// to capacity and NUL-padded; length validation happens at statement
    /// preparation time.
    pub fn serialize(&self, dest: &mut [u8]) {
        dest[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_ne_bytes());
        write_text_field(
            &mut dest[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE],
            &self.username,
        );
        write_text_field(&mut dest[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE], &self.email);
    }

    /// Read a row back from a ROW_SIZE byte frame.
    pub fn deserialize(src: &[u8]) -> Self {
        let id = u32::from_ne_bytes(src[ID_OFFSET..ID_OFFSET + ID_SIZE].try_into().unwrap());
        let username = read_text_field(&src[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]);
        let email = read_text_field(&src[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]);
        Self { id, username, email }
    }
}

fn write_text_field(dest: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    // Capacity includes the terminator, so at most len - 1 data bytes.
    let n = bytes.len().min(dest.len() - 1);
    dest[..n].copy_from_slice(&bytes[..n]);
    for b in dest[n..].iter_mut() {
        *b = 0;
    }
}

fn read_text_field(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}
