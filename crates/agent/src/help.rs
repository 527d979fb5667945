//! Deterministic user-facing messages for runs that cannot be answered from
//! the dataset. Nothing here calls a leaf service.

use serde::Serialize;
use tarifftok_core::{ClassifiedQuery, SupportedDomain};
use tera::{Context, Tera};

/// Last-resort text when even the help template cannot be rendered.
pub const FALLBACK_RESPONSE: &str = "I'm experiencing technical difficulties. Please try again later.";

const HANDLE_ERROR_TEMPLATE: &str = "handle_error.txt";
const NOT_FOUND_TEMPLATE: &str = "not_found.txt";

const HANDLE_ERROR_BODY: &str = r#"{{ acknowledgement }}

Make sure you're asking about a supported country and product category:
- Countries: {{ countries }}
- Product categories: {{ categories }}

Example queries that work:
{% for example in examples -%}
- "{{ example }}"
{% endfor %}
Please try again with one of these, and I'll do my best to help!"#;

const NOT_FOUND_BODY: &str = r#"I couldn't find tariff data for {{ requested }} in our database. Our tariff information covers {{ countries }} for {{ categories }}.{% if suggestion %} Would you like the rate for {{ suggestion }} instead?{% endif %}"#;

/// Why the run ended up in the help message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HelpReason {
    Unsupported,
    Failure(String),
}

impl HelpReason {
    fn acknowledgement(&self) -> String {
        match self {
            Self::Unsupported => "I can only report current and historical tariff rates, so I can't \
                answer scenario, forecast or margin questions."
                .to_string(),
            Self::Failure(message) => format!("I encountered an issue processing your query: {message}"),
        }
    }
}

#[derive(Serialize)]
struct HelpView {
    acknowledgement: String,
    countries: String,
    categories: String,
    examples: Vec<String>,
}

#[derive(Serialize)]
struct NotFoundView {
    requested: String,
    countries: String,
    categories: String,
    suggestion: Option<String>,
}

pub struct HelpMessages {
    tera: Tera,
}

impl HelpMessages {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(HANDLE_ERROR_TEMPLATE, HANDLE_ERROR_BODY)?;
        tera.add_raw_template(NOT_FOUND_TEMPLATE, NOT_FOUND_BODY)?;
        Ok(Self { tera })
    }

    pub fn handle_error(&self, reason: &HelpReason, domain: &SupportedDomain) -> Result<String, tera::Error> {
        let view = HelpView {
            acknowledgement: reason.acknowledgement(),
            countries: listing(&domain.countries),
            categories: listing(&domain.product_categories),
            examples: example_queries(domain),
        };
        self.tera.render(HANDLE_ERROR_TEMPLATE, &Context::from_serialize(view)?)
    }

    /// Explanation for a lookup that matched nothing. `suggestion` comes from
    /// [`suggest_alternative`] and is left out of the text when absent.
    pub fn not_found(
        &self,
        classification: &ClassifiedQuery,
        domain: &SupportedDomain,
        suggestion: Option<String>,
    ) -> Result<String, tera::Error> {
        let view = NotFoundView {
            requested: format!(
                "{} from {}",
                or_joined(&classification.product_categories),
                or_joined(&classification.countries)
            ),
            countries: listing(&domain.countries),
            categories: listing(&domain.product_categories),
            suggestion,
        };
        self.tera.render(NOT_FOUND_TEMPLATE, &Context::from_serialize(view)?)
    }
}

/// First pair outside the request for which `has_data` holds: the requested
/// category from another country, then another category from the requested
/// country.
pub fn suggest_alternative(
    classification: &ClassifiedQuery,
    domain: &SupportedDomain,
    has_data: impl Fn(&str, &str) -> bool,
) -> Option<String> {
    let requested = |country: &str, category: &str| {
        classification.countries.iter().any(|name| name == country)
            && classification.product_categories.iter().any(|name| name == category)
    };
    let category = classification.product_categories.first().or(domain.product_categories.first())?;
    let other_countries = domain.countries.iter().map(|country| (country, category));
    let other_categories = classification
        .countries
        .first()
        .into_iter()
        .flat_map(|country| domain.product_categories.iter().map(move |category| (country, category)));

    other_countries
        .chain(other_categories)
        .find(|(country, category)| !requested(country, category) && has_data(country, category))
        .map(|(country, category)| format!("{category} from {country}"))
}

fn listing(names: &[String]) -> String {
    if names.is_empty() {
        "no entries at the moment".to_string()
    } else {
        names.join(", ")
    }
}

fn or_joined(names: &[String]) -> String {
    match names {
        [] => "that selection".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {last}", init.join(", ")),
    }
}

/// Three queries that resolve against `domain`.
pub fn example_queries(domain: &SupportedDomain) -> Vec<String> {
    let country = |index: usize| domain.countries.get(index).or(domain.countries.first());
    let category = |index: usize| domain.product_categories.get(index).or(domain.product_categories.first());

    let (Some(first_country), Some(first_category)) = (country(0), category(0)) else {
        return vec!["What data do you have available?".to_string()];
    };

    let comparison_category = domain.product_categories.last().unwrap_or(first_category);
    let left = country(1).unwrap_or(first_country);
    let right = domain.countries.get(3).or(domain.countries.last()).unwrap_or(first_country);

    let mut examples = vec![format!("What's the tariff rate for {first_category} from {first_country}?")];
    if left != right {
        examples.push(format!("Compare tariff rates for {comparison_category} between {left} and {right}"));
    }
    examples.push(format!(
        "How much tariff is charged on {} from {}?",
        category(1).unwrap_or(first_category),
        country(2).unwrap_or(first_country)
    ));
    examples
}
