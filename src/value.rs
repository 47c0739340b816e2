use crate::name::Name;
use crate::node_id::NodeId;

/// The twelve property types the codec knows about, four-bit encoded in the
/// property entry header (spec §4.3). The discriminants are the wire
/// values and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyType {
    String = 0,
    Binary = 1,
    Long = 2,
    Double = 3,
    Decimal = 4,
    Date = 5,
    Boolean = 6,
    Name = 7,
    Path = 8,
    Reference = 9,
    WeakReference = 10,
    Uri = 11,
}

impl PropertyType {
    pub const MAX: u8 = 11;

    pub fn from_code(code: u8) -> Option<Self> {
        use PropertyType::*;
        Some(match code {
            0 => String,
            1 => Binary,
            2 => Long,
            3 => Double,
            4 => Decimal,
            5 => Date,
            6 => Boolean,
            7 => Name,
            8 => Path,
            9 => Reference,
            10 => WeakReference,
            11 => Uri,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A decimal value, kept in its already-canonicalized string form. A real
/// deployment would back this with an arbitrary-precision decimal type;
/// the wire format only ever needs `toCanonicalString`, so we store that
/// string directly rather than pull in a bignum dependency the rest of the
/// crate has no other use for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal(String);

impl Decimal {
    pub fn new(canonical: impl Into<String>) -> Self {
        Decimal(canonical.into())
    }

    pub fn canonical_string(&self) -> &str {
        &self.0
    }
}

/// A binary value: inlined content, or a reference into one of the two
/// external stores the binary placement policy can choose (spec §4.3). The
/// placement decision (which variant a fresh write produces) is made by
/// [`crate::codec::writer`]; the two reference variants are kept distinct
/// (rather than collapsed into one "external id" shape) so that decoding a
/// bundle and re-encoding it without modification reproduces the original
/// sentinel byte-for-byte instead of silently migrating the value between
/// stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryValue {
    Inline(Vec<u8>),
    BlobRef(String),
    DataStoreRef(String),
}

impl BinaryValue {
    pub fn len_hint(&self) -> usize {
        match self {
            BinaryValue::Inline(b) => b.len(),
            BinaryValue::BlobRef(_) | BinaryValue::DataStoreRef(_) => 0,
        }
    }
}

/// A single property value, tagged by [`PropertyType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Binary(BinaryValue),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    Date(String),
    Boolean(bool),
    Name(Name),
    Path(String),
    Reference(NodeId),
    WeakReference(NodeId),
    Uri(String),
}

impl Value {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::String(_) => PropertyType::String,
            Value::Binary(_) => PropertyType::Binary,
            Value::Long(_) => PropertyType::Long,
            Value::Double(_) => PropertyType::Double,
            Value::Decimal(_) => PropertyType::Decimal,
            Value::Date(_) => PropertyType::Date,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::Name(_) => PropertyType::Name,
            Value::Path(_) => PropertyType::Path,
            Value::Reference(_) => PropertyType::Reference,
            Value::WeakReference(_) => PropertyType::WeakReference,
            Value::Uri(_) => PropertyType::Uri,
        }
    }
}
