//! Type encodings and method signatures
//!
//! Methods and callbacks describe their argument/return shape with a compact
//! type-encoding string, one code per slot:
//!
//! ```text
//! c i s l q     signed char, int, short, long (32-bit), long long
//! C I S L Q     unsigned counterparts
//! f d B         float, double, bool
//! @ # :         object, class, selector references
//! v * ^T ?      void, C string, pointer to T, unknown
//! @?            block (callable object)
//! {Name=...}    struct ({Name} when opaque)
//! [N T]         array of N elements of T
//! ```
//!
//! A signature is a return encoding followed by argument encodings. Slot 0
//! is the receiver and slot 1 the selector, so `"v@:iq"` describes a void
//! method taking an `int` and a `long long`.

use std::fmt;

/// Errors produced while parsing a type encoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// Encoding string is empty
    #[error("Empty type encoding")]
    Empty,

    /// Encoding ended in the middle of a type
    #[error("Unexpected end of type encoding {0:?}")]
    UnexpectedEnd(String),

    /// Character that does not start or continue a type
    #[error("Unexpected character {ch:?} at {position} in type encoding {encoding:?}")]
    UnexpectedChar {
        /// Offending character
        ch: char,
        /// Byte offset
        position: usize,
        /// Whole encoding
        encoding: String,
    },
}

/// Size and alignment of an encoded type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    /// Size in bytes
    pub size: usize,
    /// Alignment in bytes
    pub align: usize,
}

impl Layout {
    /// Layout of a Rust type
    pub const fn of<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }
}

/// A single decoded type encoding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeEncoding {
    /// `c`
    Char,
    /// `i`
    Int,
    /// `s`
    Short,
    /// `l` (32-bit)
    Long,
    /// `q`
    LongLong,
    /// `C`
    UChar,
    /// `I`
    UInt,
    /// `S`
    UShort,
    /// `L` (32-bit)
    ULong,
    /// `Q`
    ULongLong,
    /// `f`
    Float,
    /// `d`
    Double,
    /// `B`
    Bool,
    /// `v`
    Void,
    /// `@`
    Object,
    /// `@?`
    Block,
    /// `#`
    Class,
    /// `:`
    Selector,
    /// `*`
    CString,
    /// `^T`
    Pointer(Box<TypeEncoding>),
    /// `{Name=...}`; `fields` is `None` for an opaque forward declaration
    Struct {
        /// Struct tag
        name: String,
        /// Member encodings
        fields: Option<Vec<TypeEncoding>>,
    },
    /// `[N T]`
    Array {
        /// Element count
        len: usize,
        /// Element encoding
        element: Box<TypeEncoding>,
    },
    /// `?`, no recoverable layout
    Unknown,
}

/// Classification of an argument slot
///
/// The recognized primitive and reference kinds are compared exactly;
/// everything else degrades to an opaque blob known only by its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// `c`
    Char,
    /// `i`
    Int,
    /// `s`
    Short,
    /// `l`
    Long,
    /// `q`
    LongLong,
    /// `C`
    UChar,
    /// `I`
    UInt,
    /// `S`
    UShort,
    /// `L`
    ULong,
    /// `Q`
    ULongLong,
    /// `f`
    Float,
    /// `d`
    Double,
    /// `B`
    Bool,
    /// `@` and `@?`
    Object,
    /// `#`
    Class,
    /// `:`
    Selector,
    /// `v`
    Void,
    /// Anything else, with its layout when it can be determined
    Opaque(Option<Layout>),
}

impl ArgKind {
    /// Numeric kinds are boxed into a `Number`
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            ArgKind::Object | ArgKind::Class | ArgKind::Selector | ArgKind::Void | ArgKind::Opaque(_)
        )
    }
}

impl TypeEncoding {
    /// Parse a single type encoding, rejecting trailing input
    pub fn parse(src: &str) -> Result<Self, EncodingError> {
        let mut parser = Parser::new(src);
        if parser.at_end() {
            return Err(EncodingError::Empty);
        }
        let encoding = parser.parse_type()?;
        match parser.peek() {
            None => Ok(encoding),
            Some(ch) => Err(parser.unexpected(ch)),
        }
    }

    /// Argument kind of this encoding
    pub fn kind(&self) -> ArgKind {
        match self {
            TypeEncoding::Char => ArgKind::Char,
            TypeEncoding::Int => ArgKind::Int,
            TypeEncoding::Short => ArgKind::Short,
            TypeEncoding::Long => ArgKind::Long,
            TypeEncoding::LongLong => ArgKind::LongLong,
            TypeEncoding::UChar => ArgKind::UChar,
            TypeEncoding::UInt => ArgKind::UInt,
            TypeEncoding::UShort => ArgKind::UShort,
            TypeEncoding::ULong => ArgKind::ULong,
            TypeEncoding::ULongLong => ArgKind::ULongLong,
            TypeEncoding::Float => ArgKind::Float,
            TypeEncoding::Double => ArgKind::Double,
            TypeEncoding::Bool => ArgKind::Bool,
            TypeEncoding::Object | TypeEncoding::Block => ArgKind::Object,
            TypeEncoding::Class => ArgKind::Class,
            TypeEncoding::Selector => ArgKind::Selector,
            TypeEncoding::Void => ArgKind::Void,
            _ => ArgKind::Opaque(self.layout()),
        }
    }

    /// Size and alignment, or `None` when it cannot be determined
    ///
    /// Aggregates whose size does not fit in `usize` have no layout.
    pub fn layout(&self) -> Option<Layout> {
        let layout = match self {
            TypeEncoding::Char => Layout::of::<i8>(),
            TypeEncoding::Int => Layout::of::<i32>(),
            TypeEncoding::Short => Layout::of::<i16>(),
            TypeEncoding::Long => Layout::of::<i32>(),
            TypeEncoding::LongLong => Layout::of::<i64>(),
            TypeEncoding::UChar => Layout::of::<u8>(),
            TypeEncoding::UInt => Layout::of::<u32>(),
            TypeEncoding::UShort => Layout::of::<u16>(),
            TypeEncoding::ULong => Layout::of::<u32>(),
            TypeEncoding::ULongLong => Layout::of::<u64>(),
            TypeEncoding::Float => Layout::of::<f32>(),
            TypeEncoding::Double => Layout::of::<f64>(),
            TypeEncoding::Bool => Layout::of::<bool>(),
            TypeEncoding::Void => Layout { size: 0, align: 1 },
            TypeEncoding::Object
            | TypeEncoding::Block
            | TypeEncoding::Class
            | TypeEncoding::Selector
            | TypeEncoding::CString
            | TypeEncoding::Pointer(_) => Layout::of::<usize>(),
            TypeEncoding::Struct { fields, .. } => {
                let fields = fields.as_ref()?;
                let mut size = 0usize;
                let mut align = 1usize;
                for field in fields {
                    let field = field.layout()?;
                    size = size.checked_next_multiple_of(field.align)?.checked_add(field.size)?;
                    align = align.max(field.align);
                }
                Layout {
                    size: size.checked_next_multiple_of(align)?,
                    align,
                }
            }
            TypeEncoding::Array { len, element } => {
                let element = element.layout()?;
                Layout {
                    size: element.size.checked_mul(*len)?,
                    align: element.align,
                }
            }
            TypeEncoding::Unknown => return None,
        };
        Some(layout)
    }
}

impl fmt::Display for TypeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeEncoding::Char => f.write_str("c"),
            TypeEncoding::Int => f.write_str("i"),
            TypeEncoding::Short => f.write_str("s"),
            TypeEncoding::Long => f.write_str("l"),
            TypeEncoding::LongLong => f.write_str("q"),
            TypeEncoding::UChar => f.write_str("C"),
            TypeEncoding::UInt => f.write_str("I"),
            TypeEncoding::UShort => f.write_str("S"),
            TypeEncoding::ULong => f.write_str("L"),
            TypeEncoding::ULongLong => f.write_str("Q"),
            TypeEncoding::Float => f.write_str("f"),
            TypeEncoding::Double => f.write_str("d"),
            TypeEncoding::Bool => f.write_str("B"),
            TypeEncoding::Void => f.write_str("v"),
            TypeEncoding::Object => f.write_str("@"),
            TypeEncoding::Block => f.write_str("@?"),
            TypeEncoding::Class => f.write_str("#"),
            TypeEncoding::Selector => f.write_str(":"),
            TypeEncoding::CString => f.write_str("*"),
            TypeEncoding::Pointer(inner) => write!(f, "^{}", inner),
            TypeEncoding::Struct { name, fields } => {
                write!(f, "{{{}", name)?;
                if let Some(fields) = fields {
                    f.write_str("=")?;
                    for field in fields {
                        write!(f, "{}", field)?;
                    }
                }
                f.write_str("}")
            }
            TypeEncoding::Array { len, element } => write!(f, "[{}{}]", len, element),
            TypeEncoding::Unknown => f.write_str("?"),
        }
    }
}

/// Argument and return shape of a method or callback
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    return_type: TypeEncoding,
    arguments: Vec<TypeEncoding>,
}

impl Signature {
    /// Build a signature from decoded parts (arguments include the implicit slots)
    pub fn new(return_type: TypeEncoding, arguments: Vec<TypeEncoding>) -> Self {
        Self {
            return_type,
            arguments,
        }
    }

    /// Parse a full signature such as `"v@:iq"`
    pub fn parse(types: &str) -> Result<Self, EncodingError> {
        let mut parser = Parser::new(types);
        if parser.at_end() {
            return Err(EncodingError::Empty);
        }

        let return_type = parser.parse_type()?;
        let mut arguments = Vec::new();
        while !parser.at_end() {
            arguments.push(parser.parse_type()?);
        }

        Ok(Self {
            return_type,
            arguments,
        })
    }

    /// Signature of the catch-all forwarding handler
    pub fn forward_invocation() -> Self {
        Self::new(
            TypeEncoding::Void,
            vec![TypeEncoding::Object, TypeEncoding::Selector, TypeEncoding::Object],
        )
    }

    /// Return encoding
    pub fn return_type(&self) -> &TypeEncoding {
        &self.return_type
    }

    /// All argument encodings, including the two implicit leading slots
    pub fn arguments(&self) -> &[TypeEncoding] {
        &self.arguments
    }

    /// Total number of argument slots
    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Argument encodings after the two implicit leading slots
    pub fn explicit_arguments(&self) -> &[TypeEncoding] {
        self.arguments.get(2..).unwrap_or(&[])
    }

    /// Number of explicit arguments
    pub fn explicit_count(&self) -> usize {
        self.explicit_arguments().len()
    }

    /// Check that calls with this signature can be routed through the
    /// forwarding machinery, returning the reason when they cannot.
    pub fn check_redirectable(&self) -> Result<(), &'static str> {
        match &self.return_type {
            TypeEncoding::Struct { .. } => Err("struct return types are not supported"),
            TypeEncoding::Array { .. } => Err("array return types are not supported"),
            TypeEncoding::Unknown => Err("unknown return types are not supported"),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.return_type)?;
        for argument in &self.arguments {
            write!(f, "{}", argument)?;
        }
        Ok(())
    }
}

/// Recursive-descent parser over an encoding string
struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|b| *b as char)
    }

    fn next(&mut self) -> Result<char, EncodingError> {
        let ch = self
            .peek()
            .ok_or_else(|| EncodingError::UnexpectedEnd(self.src.to_string()))?;
        self.pos += 1;
        Ok(ch)
    }

    fn expect(&mut self, expected: char) -> Result<(), EncodingError> {
        let position = self.pos;
        let ch = self.next()?;
        if ch == expected {
            Ok(())
        } else {
            Err(EncodingError::UnexpectedChar {
                ch,
                position,
                encoding: self.src.to_string(),
            })
        }
    }

    fn unexpected(&self, ch: char) -> EncodingError {
        EncodingError::UnexpectedChar {
            ch,
            position: self.pos,
            encoding: self.src.to_string(),
        }
    }

    fn number(&mut self) -> Result<usize, EncodingError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.src[start..self.pos].parse().map_err(|_| match self.peek() {
            Some(ch) => self.unexpected(ch),
            None => EncodingError::UnexpectedEnd(self.src.to_string()),
        })
    }

    fn parse_type(&mut self) -> Result<TypeEncoding, EncodingError> {
        let position = self.pos;
        let encoding = match self.next()? {
            'c' => TypeEncoding::Char,
            'i' => TypeEncoding::Int,
            's' => TypeEncoding::Short,
            'l' => TypeEncoding::Long,
            'q' => TypeEncoding::LongLong,
            'C' => TypeEncoding::UChar,
            'I' => TypeEncoding::UInt,
            'S' => TypeEncoding::UShort,
            'L' => TypeEncoding::ULong,
            'Q' => TypeEncoding::ULongLong,
            'f' => TypeEncoding::Float,
            'd' => TypeEncoding::Double,
            'B' => TypeEncoding::Bool,
            'v' => TypeEncoding::Void,
            '#' => TypeEncoding::Class,
            ':' => TypeEncoding::Selector,
            '*' => TypeEncoding::CString,
            '?' => TypeEncoding::Unknown,
            '@' if self.peek() == Some('?') => {
                self.pos += 1;
                TypeEncoding::Block
            }
            '@' => TypeEncoding::Object,
            '^' => TypeEncoding::Pointer(Box::new(self.parse_type()?)),
            '{' => self.parse_struct()?,
            '[' => {
                let len = self.number()?;
                let element = Box::new(self.parse_type()?);
                self.expect(']')?;
                TypeEncoding::Array { len, element }
            }
            ch => {
                return Err(EncodingError::UnexpectedChar {
                    ch,
                    position,
                    encoding: self.src.to_string(),
                })
            }
        };
        Ok(encoding)
    }

    fn parse_struct(&mut self) -> Result<TypeEncoding, EncodingError> {
        let start = self.pos;
        while !matches!(self.peek(), Some('=' | '}')) {
            self.next()?;
        }
        let name = self.src[start..self.pos].to_string();

        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(TypeEncoding::Struct { name, fields: None });
        }

        self.expect('=')?;
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => fields.push(self.parse_type()?),
                None => return Err(EncodingError::UnexpectedEnd(self.src.to_string())),
            }
        }
        Ok(TypeEncoding::Struct {
            name,
            fields: Some(fields),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_signature() {
        let sig = Signature::parse("v@:iq").unwrap();
        assert_eq!(sig.return_type(), &TypeEncoding::Void);
        assert_eq!(sig.argument_count(), 4);
        assert_eq!(
            sig.explicit_arguments(),
            &[TypeEncoding::Int, TypeEncoding::LongLong]
        );
        assert_eq!(sig.to_string(), "v@:iq");
    }

    #[test]
    fn test_empty_and_numeric_start_rejected() {
        assert_eq!(Signature::parse(""), Err(EncodingError::Empty));
        assert!(matches!(
            Signature::parse("24v@:"),
            Err(EncodingError::UnexpectedChar { ch: '2', position: 0, .. })
        ));
    }

    #[test]
    fn test_block_and_object_kinds() {
        let sig = Signature::parse("v@?@#:").unwrap();
        let kinds: Vec<_> = sig.arguments().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![ArgKind::Object, ArgKind::Object, ArgKind::Class, ArgKind::Selector]
        );
    }

    #[test]
    fn test_struct_layout() {
        // { char; double; int } -> 1 + 7 pad + 8 + 4 + 4 pad
        let enc = TypeEncoding::parse("{Mixed=cdi}").unwrap();
        assert_eq!(enc.layout(), Some(Layout { size: 24, align: 8 }));

        let point = TypeEncoding::parse("{CGPoint=dd}").unwrap();
        assert_eq!(point.kind(), ArgKind::Opaque(Some(Layout { size: 16, align: 8 })));
        assert_eq!(point.to_string(), "{CGPoint=dd}");
    }

    #[test]
    fn test_array_layout() {
        let array = TypeEncoding::parse("[4s]").unwrap();
        assert_eq!(array.layout(), Some(Layout { size: 8, align: 2 }));

        let nested = TypeEncoding::parse("{Rect={Point=ff}[2{Point=ff}]}").unwrap();
        assert_eq!(nested.layout(), Some(Layout { size: 24, align: 4 }));
    }

    #[test]
    fn test_unknown_layouts() {
        assert_eq!(TypeEncoding::parse("?").unwrap().layout(), None);
        // Opaque forward declaration
        assert_eq!(TypeEncoding::parse("{Handle}").unwrap().layout(), None);
        // Pointers always have a layout, whatever they point to
        assert_eq!(
            TypeEncoding::parse("^?").unwrap().layout(),
            Some(Layout::of::<usize>())
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_struct_has_no_layout() {
        let huge = TypeEncoding::parse("{S=[9223372036854775807c][9223372036854775807c][2c]}").unwrap();
        assert_eq!(huge.layout(), None);
        // Padding past the last field overflows too
        let padded = TypeEncoding::parse("{S=[18446744073709551615c]i}").unwrap();
        assert_eq!(padded.layout(), None);
        assert_eq!(huge.kind(), ArgKind::Opaque(None));

        let array = TypeEncoding::parse("[9223372036854775807q]").unwrap();
        assert_eq!(array.layout(), None);
    }

    #[test]
    fn test_redirectable_return_types() {
        assert!(Signature::parse("v@:").unwrap().check_redirectable().is_ok());
        assert!(Signature::parse("q@:").unwrap().check_redirectable().is_ok());
        assert!(Signature::parse("{P=dd}@:").unwrap().check_redirectable().is_err());
        assert!(Signature::parse("[2i]@:").unwrap().check_redirectable().is_err());
        assert!(Signature::parse("?@:").unwrap().check_redirectable().is_err());
    }

    #[test]
    fn test_malformed_encodings() {
        assert!(matches!(
            Signature::parse("v@:{Point=ff"),
            Err(EncodingError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            Signature::parse("v@:%"),
            Err(EncodingError::UnexpectedChar { ch: '%', .. })
        ));
    }
}
