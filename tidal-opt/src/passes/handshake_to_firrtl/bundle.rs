//! Lowering of edge types to handshake bundle types.
use tidal_ir::{BundleField, Direction, Type, INDEX_WIDTH};

/// Build a handshake bundle type (valid, ready, and an optional data
/// subfield) for an edge type viewed from the given port direction.
///
/// A type that is already a bundle is returned unchanged: operands whose
/// producers were converted earlier carry lowered types, and their shape is
/// kept as-is. Types outside the accepted set yield `None`; the caller
/// attaches the "Unsupported data type" diagnostic to the offending
/// operation and must not build a module from a missing bundle.
pub fn bundle_of(ty: &Type, direction: Direction) -> Option<Type> {
    let data = match ty {
        Type::Bundle(_) => return Some(ty.clone()),
        Type::SInt(width) => Some(Type::SInt(*width)),
        Type::UInt(width) => Some(Type::UInt(*width)),
        // Signless integers are treated as unsigned.
        Type::Int(width) => Some(Type::UInt(*width)),
        Type::Index => Some(Type::UInt(INDEX_WIDTH)),
        Type::None => None,
        Type::Clock => return None,
    };
    Some(build_bundle(data, direction))
}

/// Assemble the record. The flip marks the subfields flowing against the
/// port's primary direction: on an input port the ready subfield is flipped,
/// on an output port valid and data are.
fn build_bundle(data: Option<Type>, direction: Direction) -> Type {
    let flip = matches!(direction, Direction::Output);
    let signal = Type::UInt(1);
    let mut fields = vec![
        BundleField::new("valid", flip, signal.clone()),
        BundleField::new("ready", !flip, signal),
    ];
    if let Some(data_ty) = data {
        fields.push(BundleField::new("data", flip, data_ty));
    }
    Type::Bundle(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_direction_flips_ready() {
        let bundle = bundle_of(&Type::Int(32), Direction::Input).unwrap();
        let valid = bundle.field("valid").unwrap();
        let ready = bundle.field("ready").unwrap();
        let data = bundle.field("data").unwrap();
        assert!(!valid.flip && ready.flip && !data.flip);
        assert_eq!(data.ty, Type::UInt(32));
    }

    #[test]
    fn output_direction_flips_valid_and_data() {
        let bundle = bundle_of(&Type::SInt(8), Direction::Output).unwrap();
        let valid = bundle.field("valid").unwrap();
        let ready = bundle.field("ready").unwrap();
        let data = bundle.field("data").unwrap();
        assert!(valid.flip && !ready.flip && data.flip);
        assert_eq!(data.ty, Type::SInt(8));
    }

    #[test]
    fn none_type_has_no_data_subfield() {
        let bundle = bundle_of(&Type::None, Direction::Input).unwrap();
        assert!(bundle.field("data").is_none());
        assert_eq!(bundle.fields().len(), 2);
    }

    #[test]
    fn index_lowers_to_fixed_width_unsigned() {
        let bundle = bundle_of(&Type::Index, Direction::Input).unwrap();
        assert_eq!(
            bundle.field("data").unwrap().ty,
            Type::UInt(INDEX_WIDTH)
        );
    }

    #[test]
    fn bundles_pass_through_unchanged() {
        let original = bundle_of(&Type::UInt(4), Direction::Output).unwrap();
        let again = bundle_of(&original, Direction::Input).unwrap();
        assert_eq!(original, again);
    }

    #[test]
    fn clock_is_rejected() {
        assert!(bundle_of(&Type::Clock, Direction::Input).is_none());
    }
}
