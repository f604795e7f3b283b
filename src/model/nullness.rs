use crate::jvm::class_file::{
    Annotation, Attribute, AttributeLike, ConstantsPool, RuntimeInvisibleAnnotations,
    RuntimeInvisibleTypeAnnotations, RuntimeVisibleAnnotations, RuntimeVisibleTypeAnnotations,
    TypeAnnotation,
};
use crate::jvm::Error;
use bitflags::bitflags;

bitflags! {
    /// Nullness annotations attached directly to one element
    ///
    /// Parameters only ever care about `NON_NULL` and `NULLABLE`, while scopes (methods, types,
    /// packages, modules) only care about `NULL_MARKED` and `NULL_UNMARKED`. Having both of a
    /// pair is a conflict, which is left for contract resolution to report.
    pub struct NullnessMarks: u8 {
        const NON_NULL = 0b0001;
        const NULLABLE = 0b0010;
        const NULL_MARKED = 0b0100;
        const NULL_UNMARKED = 0b1000;
    }
}

/// Default declared by a module, package, type, or method
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NullnessScope {
    /// Unannotated reference types are non-null
    Marked,

    /// No default (stops any search further out)
    Unmarked,
}

/// Both defaults were declared on the same element
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConflictingScope;

impl NullnessMarks {
    /// Default declared by these marks, if any
    pub fn scope(self) -> Result<Option<NullnessScope>, ConflictingScope> {
        match (
            self.contains(NullnessMarks::NULL_MARKED),
            self.contains(NullnessMarks::NULL_UNMARKED),
        ) {
            (true, true) => Err(ConflictingScope),
            (true, false) => Ok(Some(NullnessScope::Marked)),
            (false, true) => Ok(Some(NullnessScope::Unmarked)),
            (false, false) => Ok(None),
        }
    }

    /// Marks relevant to a parameter
    pub fn parameter_marks(self) -> NullnessMarks {
        self & (NullnessMarks::NON_NULL | NullnessMarks::NULLABLE)
    }
}

/// Annotation types recognised as nullness annotations, by binary name
#[derive(Clone, Debug)]
pub struct NullnessAnnotations {
    pub non_null: Vec<String>,
    pub nullable: Vec<String>,
    pub null_marked: Vec<String>,
    pub null_unmarked: Vec<String>,
}

impl Default for NullnessAnnotations {
    fn default() -> Self {
        fn names(names: &[&str]) -> Vec<String> {
            names.iter().map(|name| name.to_string()).collect()
        }
        NullnessAnnotations {
            non_null: names(&[
                "org/jspecify/annotations/NonNull",
                "org/jetbrains/annotations/NotNull",
                "javax/annotation/Nonnull",
                "com/dua3/cabe/annotations/NotNull",
                "org/checkerframework/checker/nullness/qual/NonNull",
                "androidx/annotation/NonNull",
            ]),
            nullable: names(&[
                "org/jspecify/annotations/Nullable",
                "org/jetbrains/annotations/Nullable",
                "javax/annotation/Nullable",
                "javax/annotation/CheckForNull",
                "com/dua3/cabe/annotations/Nullable",
                "org/checkerframework/checker/nullness/qual/Nullable",
                "androidx/annotation/Nullable",
            ]),
            null_marked: names(&[
                "org/jspecify/annotations/NullMarked",
                "com/dua3/cabe/annotations/NotNullApi",
            ]),
            null_unmarked: names(&[
                "org/jspecify/annotations/NullUnmarked",
                "com/dua3/cabe/annotations/NullableApi",
            ]),
        }
    }
}

impl NullnessAnnotations {
    /// Classify an annotation type, given as a field descriptor (`Lpkg/Name;`)
    pub fn classify(&self, type_descriptor: &str) -> NullnessMarks {
        let name = match type_descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
        {
            Some(name) => name,
            None => return NullnessMarks::empty(),
        };

        let mut marks = NullnessMarks::empty();
        for (names, mark) in [
            (&self.non_null, NullnessMarks::NON_NULL),
            (&self.nullable, NullnessMarks::NULLABLE),
            (&self.null_marked, NullnessMarks::NULL_MARKED),
            (&self.null_unmarked, NullnessMarks::NULL_UNMARKED),
        ] {
            if names.iter().any(|known| known == name) {
                marks |= mark;
            }
        }
        marks
    }

    /// Marks from a list of declaration annotations
    pub fn marks_of(
        &self,
        annotations: &[Annotation],
        constants: &ConstantsPool,
    ) -> Result<NullnessMarks, Error> {
        let mut marks = NullnessMarks::empty();
        for annotation in annotations {
            marks |= self.classify(&constants.utf8(annotation.type_index)?);
        }
        Ok(marks)
    }

    /// Marks from the visible and invisible declaration annotations in an attribute list
    pub fn declaration_marks(
        &self,
        attributes: &[Attribute],
        constants: &ConstantsPool,
    ) -> Result<NullnessMarks, Error> {
        let mut marks = NullnessMarks::empty();
        for attribute in attributes {
            let annotations = if attribute.is_named(constants, RuntimeVisibleAnnotations::NAME) {
                attribute.decode::<RuntimeVisibleAnnotations>()?.0
            } else if attribute.is_named(constants, RuntimeInvisibleAnnotations::NAME) {
                attribute.decode::<RuntimeInvisibleAnnotations>()?.0
            } else {
                continue;
            };
            marks |= self.marks_of(&annotations, constants)?;
        }
        Ok(marks)
    }

    /// Marks from type annotations on the declared type of an element
    ///
    /// The filter picks out which targets are of interest.
    pub fn type_annotation_marks(
        &self,
        attributes: &[Attribute],
        constants: &ConstantsPool,
        mut select: impl FnMut(&TypeAnnotation) -> bool,
    ) -> Result<NullnessMarks, Error> {
        let mut marks = NullnessMarks::empty();
        for annotation in type_annotations(attributes, constants)? {
            if annotation.targets_declared_type() && select(&annotation) {
                marks |= self.classify(&constants.utf8(annotation.annotation.type_index)?);
            }
        }
        Ok(marks)
    }
}

/// All of the visible and invisible type annotations in an attribute list
pub fn type_annotations(
    attributes: &[Attribute],
    constants: &ConstantsPool,
) -> Result<Vec<TypeAnnotation>, Error> {
    let mut all = vec![];
    for attribute in attributes {
        if attribute.is_named(constants, RuntimeVisibleTypeAnnotations::NAME) {
            all.extend(attribute.decode::<RuntimeVisibleTypeAnnotations>()?.0);
        } else if attribute.is_named(constants, RuntimeInvisibleTypeAnnotations::NAME) {
            all.extend(attribute.decode::<RuntimeInvisibleTypeAnnotations>()?.0);
        }
    }
    Ok(all)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_known_annotations() {
        let known = NullnessAnnotations::default();
        assert_eq!(
            known.classify("Lorg/jspecify/annotations/NonNull;"),
            NullnessMarks::NON_NULL
        );
        assert_eq!(
            known.classify("Ljavax/annotation/CheckForNull;"),
            NullnessMarks::NULLABLE
        );
        assert_eq!(
            known.classify("Lcom/dua3/cabe/annotations/NotNullApi;"),
            NullnessMarks::NULL_MARKED
        );
        assert!(known.classify("Ljava/lang/Deprecated;").is_empty());
        assert!(known.classify("org/jspecify/annotations/NonNull").is_empty());
    }

    #[test]
    fn scopes() {
        assert_eq!(NullnessMarks::empty().scope(), Ok(None));
        assert_eq!(
            NullnessMarks::NULL_MARKED.scope(),
            Ok(Some(NullnessScope::Marked))
        );
        assert_eq!(
            (NullnessMarks::NULL_UNMARKED | NullnessMarks::NON_NULL).scope(),
            Ok(Some(NullnessScope::Unmarked))
        );
        assert_eq!(
            (NullnessMarks::NULL_MARKED | NullnessMarks::NULL_UNMARKED).scope(),
            Err(ConflictingScope)
        );
    }

    #[test]
    fn declaration_marks_from_attributes() {
        let mut constants = ConstantsPool::new();
        let non_null = constants
            .get_utf8("Lorg/jspecify/annotations/NonNull;")
            .unwrap();
        let marked = constants
            .get_utf8("Lorg/jspecify/annotations/NullMarked;")
            .unwrap();
        let visible = constants
            .get_attribute(&RuntimeVisibleAnnotations(vec![Annotation {
                type_index: non_null,
                element_value_pairs: vec![],
            }]))
            .unwrap();
        let invisible = constants
            .get_attribute(&RuntimeInvisibleAnnotations(vec![Annotation {
                type_index: marked,
                element_value_pairs: vec![],
            }]))
            .unwrap();

        let marks = NullnessAnnotations::default()
            .declaration_marks(&[visible, invisible], &constants)
            .unwrap();
        assert_eq!(marks, NullnessMarks::NON_NULL | NullnessMarks::NULL_MARKED);
    }
}
