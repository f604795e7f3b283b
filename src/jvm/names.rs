use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid unqualified name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Package the class belongs to (empty for the unnamed package)
    pub fn package(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[..idx],
            None => "",
        }
    }

    /// Simple name of the class, without the package
    pub fn simple_name(&self) -> &str {
        let name = self.as_str();
        &name[name.rfind('/').map_or(0, |idx| idx + 1)..]
    }

    /// Is this the synthetic class carrying package-level annotations?
    pub fn is_package_info(&self) -> bool {
        self.simple_name() == BinaryName::PACKAGE_INFO.as_str()
    }

    /// Is this the class carrying the module declaration?
    pub fn is_module_info(&self) -> bool {
        *self == BinaryName::MODULE_INFO
    }

    // JDK names
    pub const ASSERTIONERROR: Self = Self::name("java/lang/AssertionError");
    pub const ENUM: Self = Self::name("java/lang/Enum");
    pub const ILLEGALARGUMENTEXCEPTION: Self = Self::name("java/lang/IllegalArgumentException");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const RECORD: Self = Self::name("java/lang/Record");
    pub const STRING: Self = Self::name("java/lang/String");

    pub const PACKAGE_INFO: Self = Self::name("package-info");
    pub const MODULE_INFO: Self = Self::name("module-info");
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn package_of_class() {
        let name = BinaryName::from_string("com/example/Outer$Inner".to_owned()).unwrap();
        assert_eq!(name.package(), "com/example");
        assert_eq!(name.simple_name(), "Outer$Inner");
        assert!(!name.is_package_info());
        let info = BinaryName::from_string("com/example/package-info".to_owned()).unwrap();
        assert!(info.is_package_info());

        let unnamed = BinaryName::from_string("Top".to_owned()).unwrap();
        assert_eq!(unnamed.package(), "");
        assert!(BinaryName::MODULE_INFO.is_module_info());
    }

    #[test]
    fn invalid_names() {
        assert!(BinaryName::from_string("a//b".to_owned()).is_err());
        assert!(BinaryName::from_string("a.b".to_owned()).is_err());
        assert!(UnqualifiedName::from_string("x;".to_owned()).is_err());
        assert!(UnqualifiedName::from_string("value".to_owned()).is_ok());
    }
}
