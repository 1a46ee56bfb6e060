use std::fmt::{Debug, Display, Formatter};

/// Identifies a connection. Tokens are assigned by the accepting side during the handshake and
///  sent in the header of every subsequent message.
///
/// A token is never zero: zero is used on the wire to represent 'no token'.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Token(u32);

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token({:08x})", self.0)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl Token {
    /// `None` for the raw value 0
    pub fn from_raw(value: u32) -> Option<Token> {
        if value == 0 {
            None
        }
        else {
            Some(Token(value))
        }
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }

    /// Generates a random token for which `is_taken` returns false.
    pub fn generate(is_taken: impl Fn(&Token) -> bool) -> Token {
        loop {
            if let Some(token) = Token::from_raw(rand::random()) {
                if !is_taken(&token) {
                    return token;
                }
            }
        }
    }
}
