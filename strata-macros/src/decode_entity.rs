use crate::decode_field::{FieldMetadata, FieldRole, decode_field};
use convert_case::{Case, Casing};
use quote::ToTokens;
use syn::{Expr, ExprLit, ExprPath, ItemStruct, Lit, LitStr, parse::ParseBuffer};

pub(crate) struct EntityMetadata {
    pub(crate) item: ItemStruct,
    pub(crate) fields: Vec<FieldMetadata>,
    pub(crate) entity_name: String,
    pub(crate) schema: String,
    pub(crate) name: String,
    pub(crate) alternate_key: Vec<String>,
}

fn decode_key(fields: &[FieldMetadata], expr: &Expr) -> Vec<String> {
    let property = match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(v), ..
        }) => v.value(),
        Expr::Path(ExprPath { path, .. }) => path
            .segments
            .last()
            .map(|v| v.ident.to_string())
            .unwrap_or_default(),
        Expr::Tuple(tuple) => {
            return tuple
                .elems
                .iter()
                .flat_map(|v| decode_key(fields, v))
                .collect();
        }
        Expr::Paren(paren) => return decode_key(fields, &paren.expr),
        _ => panic!(
            "Error while parsing `alternate_key`, use it like: `#[strata(alternate_key = (code, \"region\"))]`"
        ),
    };
    let Some(field) = fields.iter().find(|v| v.property == property) else {
        panic!("Field `{}` in `alternate_key` does not exist in the entity", property);
    };
    if !matches!(
        field.role,
        FieldRole::Attribute | FieldRole::PrimaryKey | FieldRole::AutoNumber
    ) {
        panic!("Field `{}` in `alternate_key` is not a mapped column", property);
    }
    vec![property]
}

pub fn decode_entity(item: ItemStruct) -> EntityMetadata {
    if !item.generics.params.is_empty() {
        panic!("Entity `{}` cannot have generic parameters", item.ident);
    }
    let fields: Vec<_> = item.fields.iter().map(decode_field).collect();
    let mut entity_name = item.ident.to_string().to_case(Case::Snake);
    if entity_name.starts_with('_') {
        entity_name.remove(0);
    }
    let mut name = entity_name.clone();
    let mut schema = String::new();
    let mut alternate_key = Vec::new();
    for attr in &item.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("strata") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `strata`, use it like: `#[strata(attribute = value, ..)]`");
        };
        let _ = list.parse_nested_meta(|arg| {
            if arg.path.is_ident("name") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `name`, use it like: `#[strata(name = \"my_table\")]`");
                };
                name = value.value();
            } else if arg.path.is_ident("schema") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `schema`, use it like: `#[strata(schema = \"my_schema\")]`");
                };
                schema = value.value();
            } else if arg.path.is_ident("alternate_key") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<Expr>) else {
                    panic!("Error while parsing `alternate_key`, use it like: `#[strata(alternate_key = (code, \"region\"))]`");
                };
                if !alternate_key.is_empty() {
                    panic!("Alternate key attribute can appear just once on an entity");
                }
                alternate_key = decode_key(&fields, &value);
            } else {
                panic!(
                    "Unknown attribute `{}` inside strata macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
    }
    EntityMetadata {
        item,
        fields,
        entity_name,
        schema,
        name,
        alternate_key,
    }
}
