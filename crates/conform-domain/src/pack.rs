//! The positional wire codec used to ship resources between master and agent.
//!
//! Grammar: `<tag>{field,field,…}` where each field is either a quoted
//! string (`"` and `\` escaped with a backslash), a 32-bit scalar as eight
//! lowercase hex digits, or an 8-bit scalar as two. Fields are positional:
//! each resource kind declares its own field order, and unpacking reads
//! exactly the fields packing wrote.

use crate::error::CodecError;

// ── Packing ───────────────────────────────────────────────────────────────────

pub struct Packer {
    out: String,
    first: bool,
}

impl Packer {
    pub fn new(tag: &str) -> Self {
        let mut out = String::with_capacity(64);
        out.push_str(tag);
        out.push('{');
        Packer { out, first: true }
    }

    fn sep(&mut self) {
        if self.first {
            self.first = false;
        } else {
            self.out.push(',');
        }
    }

    pub fn str(mut self, s: &str) -> Self {
        self.sep();
        self.out.push('"');
        for c in s.chars() {
            if c == '"' || c == '\\' {
                self.out.push('\\');
            }
            self.out.push(c);
        }
        self.out.push('"');
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.sep();
        self.out.push_str(&format!("{:08x}", v));
        self
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.sep();
        self.out.push_str(&format!("{:02x}", v));
        self
    }

    pub fn bool(self, v: bool) -> Self {
        self.u8(v as u8)
    }

    pub fn finish(mut self) -> String {
        self.out.push('}');
        self.out
    }
}

// ── Unpacking ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Unpacker<'a> {
    rest: &'a str,
    first: bool,
}

impl<'a> Unpacker<'a> {
    pub fn new(packed: &'a str, tag: &str) -> Result<Self, CodecError> {
        let body = packed
            .strip_prefix(tag)
            .and_then(|b| b.strip_prefix('{'))
            .ok_or_else(|| CodecError::Tag { expected: tag.to_string() })?;
        Ok(Unpacker { rest: body, first: true })
    }

    fn sep(&mut self) -> Result<(), CodecError> {
        if self.first {
            self.first = false;
            return Ok(());
        }
        self.rest = self
            .rest
            .strip_prefix(',')
            .ok_or(CodecError::Truncated { what: "field separator" })?;
        Ok(())
    }

    pub fn str(&mut self) -> Result<String, CodecError> {
        self.sep()?;
        self.rest = self
            .rest
            .strip_prefix('"')
            .ok_or(CodecError::Truncated { what: "string field" })?;

        let mut out = String::new();
        let mut chars = self.rest.char_indices();
        loop {
            match chars.next() {
                Some((i, '"')) => {
                    self.rest = &self.rest[i + 1..];
                    return Ok(out);
                }
                Some((_, '\\')) => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => return Err(CodecError::Truncated { what: "string escape" }),
                },
                Some((_, c)) => out.push(c),
                None => return Err(CodecError::Truncated { what: "string field" }),
            }
        }
    }

    fn hex(&mut self, digits: usize, what: &'static str) -> Result<u32, CodecError> {
        self.sep()?;
        if self.rest.len() < digits || !self.rest.is_char_boundary(digits) {
            return Err(CodecError::Truncated { what });
        }
        let (field, rest) = self.rest.split_at(digits);
        let value = u32::from_str_radix(field, 16).map_err(|_| CodecError::Malformed {
            what,
            found: field.to_string(),
        })?;
        self.rest = rest;
        Ok(value)
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        self.hex(8, "u32 field")
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.hex(2, "u8 field")? as u8)
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    /// Consume the closing brace. Fails if fields remain or data follows.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.rest {
            "}" => Ok(()),
            "" => Err(CodecError::Truncated { what: "closing brace" }),
            _ => Err(CodecError::Trailing),
        }
    }
}
