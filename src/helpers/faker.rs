//! Fake data helpers.
//!
//! `{{faker 'category.method' args... key=value...}}` dispatches into a table
//! of generators keyed by method name. The shorthand helpers (`firstName`,
//! `int`, `guid`, ...) call the same generators directly.

use super::date::random_between;
use super::{arg, args, helper_error, number_value, render_value, to_number, value_helper};
use chrono::{Duration, Local, SecondsFormat};
use fake::Fake;
use fake::faker::{
    address::en as address, company::en as company, creditcard::en as creditcard,
    currency::en as currency, filesystem::en as filesystem, finance::en as finance,
    internet::en as internet, job::en as job, lorem::en as lorem, name::en as name,
    phone_number::en as phone,
};
use handlebars::{Handlebars, Helper, RenderError};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A fake data generator.
type Generator = fn(&FakerArgs) -> Value;

static GENERATORS: OnceLock<Registry> = OnceLock::new();

/// Upper bound for word, character and element counts.
const MAX_COUNT: usize = 10_000;

const VALID_EXAMPLES: &str = "(valid: \"address.zipCode\", \"date.past\", etc)";

const COLORS: &[&str] = &[
    "red", "orange", "yellow", "green", "teal", "blue", "indigo", "violet", "purple", "pink",
    "white", "black", "grey", "silver", "gold", "maroon", "olive", "lime", "cyan", "magenta",
];
const DEPARTMENTS: &[&str] = &[
    "Books", "Electronics", "Garden", "Grocery", "Health", "Home", "Kids", "Music", "Outdoors",
    "Sports", "Tools", "Toys",
];
const PRODUCT_ADJECTIVES: &[&str] = &[
    "Small", "Ergonomic", "Rustic", "Intelligent", "Gorgeous", "Sleek", "Practical", "Handcrafted",
];
const PRODUCT_MATERIALS: &[&str] = &[
    "Steel", "Wooden", "Concrete", "Plastic", "Cotton", "Granite", "Rubber", "Fresh",
];
const PRODUCTS: &[&str] = &[
    "Chair", "Car", "Computer", "Keyboard", "Mouse", "Bike", "Ball", "Gloves", "Table", "Shoes",
];
const MONTHS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const WEEKDAYS: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Arguments forwarded to a generator: positional ones after the method name,
/// plus the hash.
#[derive(Debug, Default)]
pub struct FakerArgs {
    positional: Vec<Value>,
    named: Map<String, Value>,
}

impl FakerArgs {
    fn from_helper(h: &Helper<'_>) -> Self {
        Self {
            positional: args(h)
                .into_iter()
                .skip(1)
                .map(|v| v.cloned().unwrap_or(Value::Null))
                .collect(),
            named: h
                .hash()
                .iter()
                .filter(|(_, v)| !v.is_value_missing())
                .map(|(k, v)| (k.to_string(), v.value().clone()))
                .collect(),
        }
    }

    /// A numeric option, by hash name first, then by position.
    fn number(&self, index: usize, name: &str) -> Option<f64> {
        self.named
            .get(name)
            .or_else(|| self.positional.get(index))
            .map(|v| to_number(Some(v)))
            .filter(|n| !n.is_nan())
    }

    /// A count option, clamped to `0..=MAX_COUNT`.
    fn count(&self, index: usize, name: &str, default: usize) -> usize {
        self.number(index, name)
            .map_or(default, |n| n.clamp(0.0, MAX_COUNT as f64) as usize)
    }

    fn array(&self, index: usize) -> &[Value] {
        match self.positional.get(index) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    fn text(&self, index: usize, name: &str) -> Option<&str> {
        self.named
            .get(name)
            .or_else(|| self.positional.get(index))
            .and_then(Value::as_str)
    }
}

pub(crate) fn register(handlebars: &mut Handlebars<'static>) {
    handlebars.register_helper("faker", value_helper(faker));

    handlebars.register_helper("int", value_helper(int));
    handlebars.register_helper("float", value_helper(float));
    handlebars.register_helper("lorem", value_helper(lorem_sentence));
    handlebars.register_helper(
        "ipv6",
        value_helper(|_| Ok(json!(internet::IPv6().fake::<String>()))),
    );
    let shorthands: [(&str, &str); 21] = [
        ("boolean", "datatype.boolean"),
        ("title", "name.prefix"),
        ("firstName", "name.firstName"),
        ("lastName", "name.lastName"),
        ("company", "company.companyName"),
        ("domain", "internet.domainName"),
        ("tld", "internet.domainSuffix"),
        ("email", "internet.email"),
        ("street", "address.streetAddress"),
        ("city", "address.city"),
        ("country", "address.country"),
        ("countryCode", "address.countryCode"),
        ("zipcode", "address.zipCode"),
        ("postcode", "address.zipCode"),
        ("lat", "address.latitude"),
        ("long", "address.longitude"),
        ("phone", "phone.phoneNumber"),
        ("color", "commerce.color"),
        ("hexColor", "internet.color"),
        ("guid", "datatype.uuid"),
        ("ipv4", "internet.ip"),
    ];
    for (helper, method) in shorthands {
        if let Some(generator) = generators().get(method).copied() {
            handlebars.register_helper(helper, value_helper(move |_| Ok(generator(&FakerArgs::default()))));
        }
    }
}

/// `{{faker 'category.method' ...}}`
fn faker(h: &Helper<'_>) -> Result<Value, RenderError> {
    let method = arg(h, 0).map(render_value).unwrap_or_default();
    if method.is_empty() {
        return Err(helper_error(format!("Faker method name is missing {VALID_EXAMPLES}")));
    }

    let generator = is_method_name(&method)
        .then(|| generators().get(method.as_str()))
        .flatten()
        .ok_or_else(|| helper_error(format!("{method} is not a valid Faker method {VALID_EXAMPLES}")))?;

    Ok(match generator(&FakerArgs::from_helper(h)) {
        value @ (Value::Array(_) | Value::Object(_)) => Value::String(value.to_string()),
        value => value,
    })
}

/// `category.method`, both parts made of ASCII letters.
fn is_method_name(method: &str) -> bool {
    let is_word = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic());
    method
        .split_once('.')
        .is_some_and(|(category, name)| is_word(category) && is_word(name))
}

/// `{{int [min] [max]}}`
fn int(h: &Helper<'_>) -> Result<Value, RenderError> {
    let (min, max) = numeric_bounds(h);
    Ok(number_value(random_number(min, max, 1.0)))
}

/// `{{float [min] [max]}}`
fn float(h: &Helper<'_>) -> Result<Value, RenderError> {
    let (min, max) = numeric_bounds(h);
    Ok(number_value(random_number(min, max, 1e-10)))
}

/// Only number literals set the bounds of the shorthand number helpers.
fn numeric_bounds(h: &Helper<'_>) -> (f64, f64) {
    let bound = |index: usize, default: f64| match arg(h, index) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        _ => default,
    };
    (bound(0, 0.0), bound(1, 99999.0))
}

/// `{{lorem [wordCount]}}`
fn lorem_sentence(h: &Helper<'_>) -> Result<Value, RenderError> {
    let words = match arg(h, 0) {
        Some(Value::Number(n)) => n.as_f64().map_or(3, |n| n.clamp(1.0, MAX_COUNT as f64) as usize),
        _ => rand::thread_rng().gen_range(3..=10),
    };
    Ok(Value::String(lorem::Sentence(words..words + 1).fake()))
}

/// Random multiple of `precision` in `[min, max]`.
fn random_number(min: f64, max: f64, precision: f64) -> f64 {
    let (min, max) = if max < min { (max, min) } else { (min, max) };
    let steps = ((max - min) / precision).floor().max(0.0) as u64;
    let step = rand::thread_rng().gen_range(0..=steps);
    let n = min + step as f64 * precision;
    if precision >= 1.0 {
        n.round()
    } else {
        let scale = (1.0 / precision).round();
        (n * scale).round() / scale
    }
}

fn pick(items: &[&str]) -> Value {
    json!(items.choose(&mut rand::thread_rng()).copied().unwrap_or_default())
}

fn random_chars(alphabet: &[u8], count: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

fn hex(count: usize) -> String {
    random_chars(b"0123456789abcdef", count)
}

fn uuid() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffff_ffff_ffff,
    )
}

fn domain_word() -> String {
    let word: String = lorem::Word().fake();
    word.to_lowercase()
}

fn words(count: usize) -> Vec<String> {
    lorem::Words(count..count + 1).fake()
}

/// RFC 3339 timestamp `days` days away from now, in a random direction within
/// the span. `null` when the span leaves the representable date range.
fn offset_date(days: f64) -> Value {
    let now = Local::now();
    let millis = (days * 86_400_000.0) as i64;
    match Duration::try_milliseconds(millis).and_then(|span| now.checked_add_signed(span)) {
        Some(other) => json!(random_between(now, other).to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => Value::Null,
    }
}

/// Generators keyed by `category.method`.
#[derive(Default)]
struct Registry(HashMap<String, Generator>);

impl Registry {
    fn add(&mut self, method: &str, generator: Generator) {
        self.0.insert(method.to_string(), generator);
    }

    fn get(&self, method: &str) -> Option<&Generator> {
        self.0.get(method)
    }
}

fn generators() -> &'static Registry {
    GENERATORS.get_or_init(|| {
        let mut table = Registry::default();

        table.add("address.zipCode", |_| json!(address::ZipCode().fake::<String>()));
        table.add("address.city", |_| json!(address::CityName().fake::<String>()));
        table.add("address.cityPrefix", |_| json!(address::CityPrefix().fake::<String>()));
        table.add("address.citySuffix", |_| json!(address::CitySuffix().fake::<String>()));
        table.add("address.streetName", |_| json!(address::StreetName().fake::<String>()));
        table.add("address.streetAddress", |_| {
            let number: String = address::BuildingNumber().fake();
            let street: String = address::StreetName().fake();
            json!(format!("{number} {street}"))
        });
        table.add("address.streetSuffix", |_| json!(address::StreetSuffix().fake::<String>()));
        table.add("address.secondaryAddress", |_| {
            json!(address::SecondaryAddress().fake::<String>())
        });
        table.add("address.country", |_| json!(address::CountryName().fake::<String>()));
        table.add("address.countryCode", |_| json!(address::CountryCode().fake::<String>()));
        table.add("address.state", |_| json!(address::StateName().fake::<String>()));
        table.add("address.stateAbbr", |_| json!(address::StateAbbr().fake::<String>()));
        table.add("address.latitude", |_| json!(address::Latitude().fake::<String>()));
        table.add("address.longitude", |_| json!(address::Longitude().fake::<String>()));
        table.add("address.timeZone", |_| json!(address::TimeZone().fake::<String>()));
        table.add("address.buildingNumber", |_| {
            json!(address::BuildingNumber().fake::<String>())
        });

        table.add("commerce.color", |_| pick(COLORS));
        table.add("commerce.department", |_| pick(DEPARTMENTS));
        table.add("commerce.productName", |_| {
            let parts = [pick(PRODUCT_ADJECTIVES), pick(PRODUCT_MATERIALS), pick(PRODUCTS)];
            json!(parts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "))
        });
        table.add("commerce.price", |a| {
            let min = a.number(0, "min").unwrap_or(1.0);
            let max = a.number(1, "max").unwrap_or(1000.0);
            let decimals = a.count(2, "dec", 2);
            json!(format!("{:.*}", decimals, random_number(min, max, 0.01)))
        });

        table.add("company.companyName", |_| json!(company::CompanyName().fake::<String>()));
        table.add("company.companySuffix", |_| json!(company::CompanySuffix().fake::<String>()));
        table.add("company.catchPhrase", |_| json!(company::CatchPhrase().fake::<String>()));
        table.add("company.bs", |_| json!(company::Bs().fake::<String>()));
        table.add("company.bsAdjective", |_| json!(company::BsAdj().fake::<String>()));
        table.add("company.bsNoun", |_| json!(company::BsNoun().fake::<String>()));
        table.add("company.bsBuzz", |_| json!(company::BsVerb().fake::<String>()));

        for category in ["datatype", "random"] {
            let method = |name: &str| format!("{category}.{name}");
            table.add(&method("number"), |a| {
                let (min, max) = match (a.number(0, "min"), a.number(1, "max")) {
                    (Some(max), None) if a.named.get("min").is_none() => (0.0, max),
                    (min, max) => (min.unwrap_or(0.0), max.unwrap_or(99999.0)),
                };
                let precision = a.number(2, "precision").filter(|p| *p > 0.0).unwrap_or(1.0);
                number_value(random_number(min, max, precision))
            });
            table.add(&method("float"), |a| {
                let min = a.number(0, "min").unwrap_or(0.0);
                let max = a.number(1, "max").unwrap_or(99999.0);
                let precision = a.number(2, "precision").filter(|p| *p > 0.0).unwrap_or(0.01);
                number_value(random_number(min, max, precision))
            });
            table.add(&method("uuid"), |_| json!(uuid()));
            table.add(&method("boolean"), |_| json!(rand::thread_rng().gen_bool(0.5)));
            table.add(&method("alphaNumeric"), |a| {
                json!(random_chars(b"0123456789abcdefghijklmnopqrstuvwxyz", a.count(0, "count", 1)))
            });
            table.add(&method("hexaDecimal"), |a| json!(format!("0x{}", hex(a.count(0, "count", 1)))));
            table.add(&method("word"), |_| json!(lorem::Word().fake::<String>()));
            table.add(&method("words"), |a| {
                let count = a.count(0, "count", rand::thread_rng().gen_range(1..=3));
                json!(words(count).join(" "))
            });
            table.add(&method("arrayElement"), |a| {
                a.array(0)
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .unwrap_or(Value::Null)
            });
            table.add(&method("arrayElements"), |a| {
                let mut items = a.array(0).to_vec();
                let mut rng = rand::thread_rng();
                let count = a.count(1, "count", rng.gen_range(1..=items.len().max(1)));
                items.shuffle(&mut rng);
                items.truncate(count);
                Value::Array(items)
            });
        }

        table.add("date.past", |a| offset_date(-a.number(0, "years").unwrap_or(1.0) * 365.0));
        table.add("date.future", |a| offset_date(a.number(0, "years").unwrap_or(1.0) * 365.0));
        table.add("date.recent", |a| offset_date(-a.number(0, "days").unwrap_or(1.0)));
        table.add("date.soon", |a| offset_date(a.number(0, "days").unwrap_or(1.0)));
        table.add("date.between", |a| {
            let from = a.text(0, "from").and_then(super::date::parse_date);
            let to = a.text(1, "to").and_then(super::date::parse_date);
            match (from, to) {
                (Some(from), Some(to)) => {
                    json!(random_between(from, to).to_rfc3339_opts(SecondsFormat::Millis, true))
                }
                _ => Value::Null,
            }
        });
        table.add("date.month", |_| pick(MONTHS));
        table.add("date.weekday", |_| pick(WEEKDAYS));

        table.add("finance.amount", |a| {
            let min = a.number(0, "min").unwrap_or(0.0);
            let max = a.number(1, "max").unwrap_or(1000.0);
            let decimals = a.count(2, "dec", 2);
            let precision = 10f64.powi(-(decimals.min(10) as i32));
            json!(format!("{:.*}", decimals, random_number(min, max, precision)))
        });
        table.add("finance.account", |a| {
            json!(random_chars(b"0123456789", a.count(0, "length", 8)))
        });
        table.add("finance.currencyCode", |_| json!(currency::CurrencyCode().fake::<String>()));
        table.add("finance.currencyName", |_| json!(currency::CurrencyName().fake::<String>()));
        table.add("finance.currencySymbol", |_| {
            json!(currency::CurrencySymbol().fake::<String>())
        });
        table.add("finance.bic", |_| json!(finance::Bic().fake::<String>()));
        table.add("finance.creditCardNumber", |_| {
            json!(creditcard::CreditCardNumber().fake::<String>())
        });

        table.add("internet.email", |_| json!(internet::FreeEmail().fake::<String>()));
        table.add("internet.exampleEmail", |_| json!(internet::SafeEmail().fake::<String>()));
        table.add("internet.userName", |_| json!(internet::Username().fake::<String>()));
        table.add("internet.domainName", |_| {
            let suffix: String = internet::DomainSuffix().fake();
            json!(format!("{}.{suffix}", domain_word()))
        });
        table.add("internet.domainSuffix", |_| json!(internet::DomainSuffix().fake::<String>()));
        table.add("internet.domainWord", |_| json!(domain_word()));
        table.add("internet.ip", |_| json!(internet::IPv4().fake::<String>()));
        table.add("internet.mac", |_| json!(internet::MACAddress().fake::<String>()));
        table.add("internet.url", |_| {
            let suffix: String = internet::DomainSuffix().fake();
            json!(format!("https://{}.{suffix}", domain_word()))
        });
        table.add("internet.userAgent", |_| json!(internet::UserAgent().fake::<String>()));
        table.add("internet.password", |a| {
            let len = a.count(0, "length", 15).max(1);
            json!(internet::Password(len..len + 1).fake::<String>())
        });
        table.add("internet.color", |_| {
            json!(format!("{:x}", rand::thread_rng().gen_range(0..=0xff_ffff_u32)))
        });

        table.add("lorem.word", |_| json!(lorem::Word().fake::<String>()));
        table.add("lorem.words", |a| json!(words(a.count(0, "count", 3)).join(" ")));
        table.add("lorem.sentence", |a| {
            let count = a.count(0, "wordCount", rand::thread_rng().gen_range(3..=10)).max(1);
            json!(lorem::Sentence(count..count + 1).fake::<String>())
        });
        table.add("lorem.sentences", |a| {
            let count = a.count(0, "sentenceCount", rand::thread_rng().gen_range(2..=6)).max(1);
            json!(lorem::Sentences(count..count + 1).fake::<Vec<String>>().join(" "))
        });
        table.add("lorem.paragraph", |a| {
            let count = a.count(0, "sentenceCount", 3).max(1);
            json!(lorem::Paragraph(count..count + 1).fake::<String>())
        });
        table.add("lorem.paragraphs", |a| {
            let count = a.count(0, "paragraphCount", 3).max(1);
            json!(lorem::Paragraphs(count..count + 1).fake::<Vec<String>>().join("\n \r"))
        });
        table.add("lorem.text", |_| {
            let count = rand::thread_rng().gen_range(2..=5);
            json!(lorem::Sentences(count..count + 1).fake::<Vec<String>>().join(" "))
        });
        table.add("lorem.lines", |a| {
            let count = a.count(0, "lineCount", rand::thread_rng().gen_range(1..=5)).max(1);
            json!(lorem::Sentences(count..count + 1).fake::<Vec<String>>().join("\n"))
        });
        table.add("lorem.slug", |a| json!(words(a.count(0, "wordCount", 3)).join("-")));

        table.add("name.firstName", |_| json!(name::FirstName().fake::<String>()));
        table.add("name.lastName", |_| json!(name::LastName().fake::<String>()));
        table.add("name.findName", |_| json!(name::Name().fake::<String>()));
        table.add("name.prefix", |_| json!(name::Title().fake::<String>()));
        table.add("name.suffix", |_| json!(name::Suffix().fake::<String>()));
        table.add("name.title", |_| json!(job::Title().fake::<String>()));
        table.add("name.jobTitle", |_| json!(job::Title().fake::<String>()));
        table.add("name.jobArea", |_| json!(job::Field().fake::<String>()));
        table.add("name.jobType", |_| json!(job::Position().fake::<String>()));
        table.add("name.jobDescriptor", |_| json!(job::Seniority().fake::<String>()));

        table.add("phone.phoneNumber", |_| json!(phone::PhoneNumber().fake::<String>()));

        table.add("system.fileName", |_| json!(filesystem::FileName().fake::<String>()));
        table.add("system.fileExt", |_| json!(filesystem::FileExtension().fake::<String>()));
        table.add("system.filePath", |_| json!(filesystem::FilePath().fake::<String>()));
        table.add("system.directoryPath", |_| json!(filesystem::DirPath().fake::<String>()));
        table.add("system.mimeType", |_| json!(filesystem::MimeType().fake::<String>()));
        table.add("system.semver", |_| json!(filesystem::Semver().fake::<String>()));

        table.add("git.shortSha", |_| json!(hex(7)));
        table.add("git.commitSha", |_| json!(hex(40)));

        table
    })
}

/// Every registered `category.method` name.
pub fn methods() -> Vec<&'static str> {
    let mut methods: Vec<_> = generators().0.keys().map(String::as_str).collect();
    methods.sort_unstable();
    methods
}
