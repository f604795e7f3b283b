use super::{BinaryName, Error, Name};
use crate::util::Width;
use std::iter::Peekable;
use std::str::Chars;

type Result<A> = std::result::Result<A, Error>;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars).map_err(|err| match err {
            Error::BadDescriptor(reason) => {
                Error::BadDescriptor(format!("{} (in '{}')", reason, source))
            }
            other => other,
        })?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => Err(Error::BadDescriptor(format!(
                "unexpected leftover input '{}' in '{}'",
                c, source
            ))),
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

/// Number of local variable slots taken up by a value of this type
impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("invalid base type character '{}'", c);
                return Err(Error::BadDescriptor(msg));
            }
            None => return Err(Error::BadDescriptor("missing base type".to_owned())),
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next_if_eq(&'L').is_none() {
            let msg = "expected object type to start with `L`".to_owned();
            return Err(Error::BadDescriptor(msg));
        }
        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => return BinaryName::from_string(class_name).map_err(Error::BadDescriptor),
                Some(c) => class_name.push(c),
                None => {
                    let msg = format!("missing terminator for 'L{}'", class_name);
                    return Err(Error::BadDescriptor(msg));
                }
            }
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(C::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if additional_dimensions >= 255 {
                    let msg = "array type has more than 255 dimensions".to_owned();
                    return Err(Error::BadDescriptor(msg));
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: C::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("invalid reference type character '{}'", c);
                return Err(Error::BadDescriptor(msg));
            }
            None => return Err(Error::BadDescriptor("missing field type".to_owned())),
        })
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

/// Number of local variable slots taken up by a value of this type
impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    /// Can a value of this type be `null`?
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Ref(_))
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            _ => RefType::parse_from(source).map(FieldType::Ref),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,
    pub return_type: Option<FieldType<Class>>, // `None` is for `void` (ie. no return)
}

impl<C> MethodDescriptor<C> {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_length = if has_this_param { 1 } else { 0 };
        this_length + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Local variable slot of each parameter on method entry
    pub fn parameter_slots(&self, has_this_param: bool) -> Vec<u16> {
        let mut slot: u16 = if has_this_param { 1 } else { 0 };
        let mut slots = Vec::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            slots.push(slot);
            slot += parameter.width() as u16;
        }
        slots
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next_if_eq(&'(').is_none() {
            return Err(Error::BadDescriptor("expected '(' for method".to_owned()));
        }

        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            if source.peek().is_none() {
                return Err(Error::BadDescriptor("expected ')' for method".to_owned()));
            }
            parameters.push(FieldType::<C>::parse_from(source)?);
        }

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::<C>::parse_from(source)?)
        };

        let descriptor = MethodDescriptor {
            parameters,
            return_type,
        };
        if descriptor.parameter_length(false) > 255 {
            let msg = "method has more than 255 parameter slots".to_owned();
            return Err(Error::BadDescriptor(msg));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + Debug + Eq>(rendered: &str, parsed: T) {
        assert_eq!(rendered, parsed.render());
        assert_eq!(T::parse(rendered).unwrap(), parsed);
    }

    type FT = FieldType<BinaryName>;

    const INT: FT = FieldType::Base(BaseType::Int);
    const DOUBLE: FT = FieldType::Base(BaseType::Double);
    const OBJECT: FT = FieldType::object(BinaryName::OBJECT);
    const STRING: FT = FieldType::object(BinaryName::STRING);

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Ljava/lang/Object;", OBJECT);
        round_trip(
            "[[[D",
            FT::Ref(RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 2,
                element_type: BaseType::Double,
            })),
        );
        round_trip(
            "[Ljava/lang/String;",
            FieldType::Ref(RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type: BinaryName::STRING,
            })),
        );
    }

    #[test]
    fn method_descriptors() {
        round_trip(
            "(IDLjava/lang/String;)Ljava/lang/Object;",
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, STRING],
                return_type: Some(OBJECT),
            },
        );
        round_trip(
            "()V",
            MethodDescriptor {
                parameters: Vec::<FT>::new(),
                return_type: None,
            },
        );
    }

    #[test]
    fn parameter_slots_skip_wide_types() {
        let descriptor: MethodDescriptor<BinaryName> =
            MethodDescriptor::parse("(JLjava/lang/String;D[I)V").unwrap();
        assert_eq!(descriptor.parameter_slots(false), vec![0, 2, 3, 5]);
        assert_eq!(descriptor.parameter_slots(true), vec![1, 3, 4, 6]);
        assert_eq!(descriptor.parameter_length(true), 7);
        let references: Vec<bool> = descriptor
            .parameters
            .iter()
            .map(FieldType::is_reference)
            .collect();
        assert_eq!(references, vec![false, true, false, true]);
    }

    #[test]
    fn malformed_descriptors() {
        for bad in ["(I", "(Q)V", "(Ljava/lang/String)V", "()", "(I)VV", "I"] {
            assert!(
                matches!(
                    MethodDescriptor::<BinaryName>::parse(bad),
                    Err(Error::BadDescriptor(_))
                ),
                "{} should not parse",
                bad
            );
        }
    }
}
