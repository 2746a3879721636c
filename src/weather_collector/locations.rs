// weather_collector - WeatherAPI.com observations published to Azure Event Hubs
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::fmt;

/// A city to fetch weather for along with metadata attached to each record.
///
/// `city` is sent as-is as the `q` parameter to the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub city: &'static str,
    pub subdivision_code: &'static str,
    pub region_label: &'static str,
}

impl Location {
    const fn new(city: &'static str, subdivision_code: &'static str, region_label: &'static str) -> Self {
        Location {
            city,
            subdivision_code,
            region_label,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.city, self.subdivision_code)
    }
}

// Capital of each Brazilian federative unit, ordered by state code.
const STATE_CAPITALS: [Location; 27] = [
    Location::new("Rio Branco", "AC", "Norte"),
    Location::new("Maceió", "AL", "Nordeste"),
    Location::new("Macapá", "AP", "Norte"),
    Location::new("Manaus", "AM", "Norte"),
    Location::new("Salvador", "BA", "Nordeste"),
    Location::new("Fortaleza", "CE", "Nordeste"),
    Location::new("Brasília", "DF", "Centro-Oeste"),
    Location::new("Vitória", "ES", "Sudeste"),
    Location::new("Goiânia", "GO", "Centro-Oeste"),
    Location::new("São Luís", "MA", "Nordeste"),
    Location::new("Cuiabá", "MT", "Centro-Oeste"),
    Location::new("Campo Grande", "MS", "Centro-Oeste"),
    Location::new("Belo Horizonte", "MG", "Sudeste"),
    Location::new("Belém", "PA", "Norte"),
    Location::new("João Pessoa", "PB", "Nordeste"),
    Location::new("Curitiba", "PR", "Sul"),
    Location::new("Recife", "PE", "Nordeste"),
    Location::new("Teresina", "PI", "Nordeste"),
    Location::new("Rio de Janeiro", "RJ", "Sudeste"),
    Location::new("Natal", "RN", "Nordeste"),
    Location::new("Porto Alegre", "RS", "Sul"),
    Location::new("Porto Velho", "RO", "Norte"),
    Location::new("Boa Vista", "RR", "Norte"),
    Location::new("Florianópolis", "SC", "Sul"),
    Location::new("São Paulo", "SP", "Sudeste"),
    Location::new("Aracaju", "SE", "Nordeste"),
    Location::new("Palmas", "TO", "Norte"),
];

/// Every location processed on each run, in the same order every time.
pub fn all() -> &'static [Location] {
    &STATE_CAPITALS
}

#[cfg(test)]
mod test {
    use super::all;
    use std::collections::HashSet;

    #[test]
    fn test_one_location_per_state() {
        let locations = all();
        let cities: HashSet<_> = locations.iter().map(|l| l.city).collect();
        let codes: HashSet<_> = locations.iter().map(|l| l.subdivision_code).collect();

        assert_eq!(27, locations.len());
        assert_eq!(27, cities.len());
        assert_eq!(27, codes.len());
    }

    #[test]
    fn test_order_is_fixed() {
        let locations = all();

        assert_eq!("Rio Branco", locations[0].city);
        assert_eq!("Palmas", locations[26].city);
        assert_eq!(all(), locations);
    }

    #[test]
    fn test_display() {
        let location = all().iter().find(|l| l.subdivision_code == "AM").unwrap();
        assert_eq!("Manaus - AM", location.to_string());
    }

    #[test]
    fn test_region_labels() {
        let regions: HashSet<_> = all().iter().map(|l| l.region_label).collect();
        let expected: HashSet<_> = ["Norte", "Nordeste", "Centro-Oeste", "Sudeste", "Sul"].into_iter().collect();

        assert_eq!(expected, regions);
    }
}
