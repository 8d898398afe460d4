use tidal_utils::Id;

/// Width used when lowering the index type. The host framework derives this
/// from its internal storage width; we fix it at 64 bits.
pub const INDEX_WIDTH: u64 = 64;

/// Direction of a port on a module. The flip pattern of a handshake bundle
/// is chosen by the direction of the port that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input port.
    Input,
    /// Output port.
    Output,
}

/// A single subfield of a bundle type.
///
/// The flip marker is a boolean on the subfield: a flipped subfield flows
/// against the primary direction of the port carrying the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleField {
    pub name: Id,
    pub flip: bool,
    pub ty: Type,
}

impl BundleField {
    pub fn new<S: Into<Id>>(name: S, flip: bool, ty: Type) -> Self {
        BundleField {
            name: name.into(),
            flip,
            ty,
        }
    }
}

/// Types carried by values in the arena.
///
/// The integer, index, and none cases type edges of the input dataflow
/// graph; clock and bundle appear once lowering has produced hardware ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Signed integer of the given width.
    SInt(u64),
    /// Unsigned integer of the given width.
    UInt(u64),
    /// Signless integer; treated as unsigned by the lowering.
    Int(u64),
    /// The index type; treated as an unsigned integer of [`INDEX_WIDTH`].
    Index,
    /// Control-only edge carrying no data payload.
    None,
    /// A clock signal.
    Clock,
    /// An ordered record of subfields.
    Bundle(Vec<BundleField>),
}

impl Type {
    /// Width of the type when it lowers to a plain integer.
    pub fn width(&self) -> Option<u64> {
        match self {
            Type::SInt(w) | Type::UInt(w) | Type::Int(w) => Some(*w),
            Type::Index => Some(INDEX_WIDTH),
            Type::None | Type::Clock | Type::Bundle(_) => None,
        }
    }

    pub fn is_clock(&self) -> bool {
        matches!(self, Type::Clock)
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, Type::Bundle(_))
    }

    /// True for the 1-bit unsigned signal type used by valid/ready/reset.
    pub fn is_signal(&self) -> bool {
        matches!(self, Type::UInt(1))
    }

    /// Subfields of a bundle type; empty for all other types.
    pub fn fields(&self) -> &[BundleField] {
        match self {
            Type::Bundle(fields) => fields,
            _ => &[],
        }
    }

    /// Look up a bundle subfield by name.
    pub fn field<S: Into<Id>>(&self, name: S) -> Option<&BundleField> {
        let name = name.into();
        self.fields().iter().find(|f| f.name == name)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::SInt(w) => write!(f, "sint<{}>", w),
            Type::UInt(w) => write!(f, "uint<{}>", w),
            Type::Int(w) => write!(f, "int<{}>", w),
            Type::Index => write!(f, "index"),
            Type::None => write!(f, "none"),
            Type::Clock => write!(f, "clock"),
            Type::Bundle(fields) => {
                write!(f, "bundle<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    if field.flip {
                        write!(f, "flip ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, ">")
            }
        }
    }
}
