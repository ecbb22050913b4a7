use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::{
    Field, GenericArgument, Ident, LitStr, Path, PathArguments, Type, ext::IdentExt,
    parse::ParseBuffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRole {
    Attribute,
    PrimaryKey,
    AutoNumber,
    Ignored,
    Skipped,
    Related,
    Relation,
}

pub(crate) struct FieldMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    /// Property name, the field identifier without the raw prefix.
    pub(crate) property: String,
    pub(crate) column: Option<String>,
    pub(crate) role: FieldRole,
    /// Target of `related(entity = ..)`.
    pub(crate) entity: Option<Path>,
    pub(crate) alias: Option<String>,
    pub(crate) use_attribute_alias: bool,
}

impl FieldMetadata {
    /// The nested entity type of a relation and whether it is wrapped in `Option`.
    pub(crate) fn relation_type(&self) -> (&Type, bool) {
        match option_inner(&self.ty) {
            Some(inner) => (inner, true),
            None => (&self.ty, false),
        }
    }
}

fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };
    match arguments.args.first() {
        Some(GenericArgument::Type(inner)) if arguments.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn set_role(metadata: &mut FieldMetadata, role: FieldRole, attribute: &str) {
    if metadata.role != FieldRole::Attribute {
        panic!(
            "Field `{}` cannot be declared `{}`, it is already {:?}",
            metadata.property, attribute, metadata.role
        );
    }
    metadata.role = role;
}

pub fn decode_field(field: &Field) -> FieldMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Entity fields are expected to have a name");
    let mut metadata = FieldMetadata {
        property: ident.unraw().to_string(),
        ident,
        ty: field.ty.clone(),
        column: None,
        role: FieldRole::Attribute,
        entity: None,
        alias: None,
        use_attribute_alias: false,
    };
    for attr in &field.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("strata") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `strata`, use it like: `#[strata(attribute = value, ..)]`");
        };
        let result = list.parse_nested_meta(|arg| {
            if arg.path.is_ident("name") {
                let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `name`, use it like: `#[strata(name = \"my_column\")]`");
                };
                metadata.column = Some(v.value());
            } else if arg.path.is_ident("primary_key") {
                set_role(&mut metadata, FieldRole::PrimaryKey, "primary_key");
            } else if arg.path.is_ident("auto_increment") {
                set_role(&mut metadata, FieldRole::AutoNumber, "auto_increment");
            } else if arg.path.is_ident("ignore") {
                set_role(&mut metadata, FieldRole::Ignored, "ignore");
            } else if arg.path.is_ident("skip") {
                set_role(&mut metadata, FieldRole::Skipped, "skip");
            } else if arg.path.is_ident("relation") {
                set_role(&mut metadata, FieldRole::Relation, "relation");
                if arg.input.peek(syn::Token![=]) {
                    let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                        panic!("Error while parsing `relation`, use it like: `#[strata(relation)]` or `#[strata(relation = \"alias\")]`");
                    };
                    metadata.alias = Some(v.value());
                }
            } else if arg.path.is_ident("related") {
                set_role(&mut metadata, FieldRole::Related, "related");
                arg.parse_nested_meta(|inner| {
                    if inner.path.is_ident("entity") {
                        let Ok(v) = inner.value().and_then(ParseBuffer::parse::<Path>) else {
                            panic!("Error while parsing `entity`, use it like: `related(entity = Category)`");
                        };
                        metadata.entity = Some(v);
                    } else if inner.path.is_ident("alias") {
                        let Ok(v) = inner.value().and_then(ParseBuffer::parse::<LitStr>) else {
                            panic!("Error while parsing `alias`, use it like: `related(entity = Category, alias = \"parent\")`");
                        };
                        metadata.alias = Some(v.value());
                    } else if inner.path.is_ident("use_attribute_alias") {
                        metadata.use_attribute_alias = true;
                    } else {
                        panic!(
                            "Unknown argument `{}` inside `related`",
                            inner.path.to_token_stream()
                        );
                    }
                    Ok(())
                })?;
                if metadata.entity.is_none() {
                    panic!(
                        "Field `{}` declares `related` without `entity = Type`",
                        metadata.property
                    );
                }
            } else {
                panic!(
                    "Unknown attribute `{}` inside strata macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
        if let Err(e) = result {
            panic!("Error while parsing `strata` on field `{}`: {}", metadata.property, e);
        }
    }
    metadata
}

/// Expression producing the type prototype of a persisted field.
pub(crate) fn prototype(metadata: &FieldMetadata) -> TokenStream {
    let ty = &metadata.ty;
    quote::quote!(<#ty as ::strata::AsValue>::as_empty_value())
}
