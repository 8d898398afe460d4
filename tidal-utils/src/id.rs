use symbol_table::GlobalSymbol;

/// A name used by the IR: function, module, and port names, bundle
/// subfields, wire and register labels.
///
/// Names are interned in the process-wide symbol table, so an `Id` is a
/// single word, copying it is free, and equality never compares string
/// contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Id(GlobalSymbol);

impl Id {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Id(GlobalSymbol::from(name.as_ref()))
    }

    /// The interned string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Id::new(name)
    }
}

impl From<String> for Id {
    fn from(name: String) -> Self {
        Id::new(name)
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let a = Id::new("valid");
        let b: Id = "valid".into();
        assert_eq!(a, b);
        assert_eq!(a, "valid");
        assert_eq!(a.to_string(), "valid");
    }

    #[test]
    fn owned_and_borrowed_names_intern_alike() {
        let from_owned = Id::from(format!("arg{}", 3));
        assert_eq!(from_owned, Id::new("arg3"));
        assert_eq!(from_owned.as_str(), "arg3");
    }
}
