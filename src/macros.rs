/// Construct a BSON value.
#[macro_export]
macro_rules! bson {
    ([]) => {{ $crate::Bson::Array(Vec::new()) }};

    ([$($val:tt),*]) => {{
        let mut array = Vec::new();

        $(
            array.push($crate::bson!($val));
        )*

        $crate::Bson::Array(array)
    }};

    ({ $($k:expr => $v:tt),* }) => {{
        $crate::Bson::Document($crate::doc! {
            $(
                $k => $v
            ),*
        })
    }};

    ($val:expr) => {{
        $crate::Bson::from($val)
    }};
}

/// Construct a BSON [`Document`](crate::Document).
#[macro_export]
macro_rules! doc {
    () => {{ $crate::Document::new() }};

    ( $($key:expr => $val:tt),* $(,)? ) => {{
        let mut document = $crate::Document::new();

        $(
            document.insert($key, $crate::bson!($val));
        )*

        document
    }};
}

/// Declare a struct with a BSON schema.
///
/// Each field may carry a tag after `=>`: `"<name>[,option…]"`, where the
/// options are `omitempty`, `minsize` and `inline`. Without a rename the
/// field encodes under its lowercased name. The struct must implement
/// `Default`, which fresh values are decoded from.
///
/// ```
/// use mongowire::bson_record;
///
/// bson_record! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct Person {
///         pub name: String,
///         pub ssn: String => "ssn,omitempty",
///         pub age: i64 => ",minsize",
///     }
/// }
/// ```
#[macro_export]
macro_rules! bson_record {
    (@tag) => { "" };
    (@tag $tag:literal) => { $tag };

    ($(
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $fvis:vis $field:ident : $ftype:ty $(=> $tag:literal)? ),* $(,)?
        }
    )+) => {$(
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $field: $ftype, )*
        }

        impl $crate::record::Record for $name {
            fn descriptor() -> &'static $crate::record::RecordDescriptor {
                static DESCRIPTOR: $crate::__private::OnceCell<$crate::record::RecordDescriptor> =
                    $crate::__private::OnceCell::new();
                DESCRIPTOR.get_or_init(|| {
                    $crate::record::RecordDescriptor::build(
                        stringify!($name),
                        &[$( (stringify!($field), $crate::bson_record!(@tag $($tag)?)) ),*],
                    )
                })
            }

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn encode_fields(
                &self,
                enc: &mut $crate::ser::StructEncoder,
            ) -> $crate::Result<()> {
                let desc = <Self as $crate::record::Record>::descriptor();
                let mut index = 0usize;
                $(
                    enc.field(desc.field(index), &self.$field)?;
                    index += 1;
                )*
                Ok(())
            }

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn decode_field(
                &mut self,
                key: &str,
                raw: &$crate::RawRef<'_>,
            ) -> $crate::Result<bool> {
                let desc = <Self as $crate::record::Record>::descriptor();
                if let Some(target) = desc.index_of(key) {
                    let mut index = 0usize;
                    $(
                        if index == target {
                            return $crate::de::assign_field(&mut self.$field, raw);
                        }
                        index += 1;
                    )*
                }
                let mut index = 0usize;
                $(
                    if desc.field(index).inline
                        && $crate::de::FromBson::accept_inline(&mut self.$field, key, raw)?
                    {
                        return Ok(true);
                    }
                    index += 1;
                )*
                Ok(false)
            }
        }

        impl $crate::ser::ToBson for $name {
            const IS_RECORD: bool = true;

            fn to_bson(&self) -> $crate::Result<$crate::Bson> {
                Ok($crate::Bson::Document($crate::record::to_document(self)?))
            }
        }

        impl $crate::de::FromBson for $name {
            fn from_bson(raw: &$crate::RawRef<'_>) -> $crate::Result<$crate::de::Decoded<Self>> {
                if raw.kind != $crate::spec::ELEMENT_TYPE_DOCUMENT {
                    return Ok($crate::de::Decoded::Skip);
                }
                let mut value = <Self as ::std::default::Default>::default();
                $crate::record::decode_record(&mut value, $crate::RawDocument::from_bytes(raw.data)?)?;
                Ok($crate::de::Decoded::Value(value))
            }

            fn accept_inline(
                &mut self,
                key: &str,
                raw: &$crate::RawRef<'_>,
            ) -> $crate::Result<bool> {
                $crate::record::Record::decode_field(self, key, raw)
            }
        }

        impl $crate::ser::EncodeDocument for $name {
            fn encode_into(&self, buf: &mut Vec<u8>) -> $crate::Result<()> {
                let doc = $crate::record::to_document(self)?;
                $crate::ser::EncodeDocument::encode_into(&doc, buf)
            }
        }

        impl $crate::de::DecodeDocument for $name {
            fn decode_document(&mut self, doc: &$crate::RawDocument) -> $crate::Result<()> {
                $crate::record::decode_record(self, doc)
            }
        }
    )+};
}
