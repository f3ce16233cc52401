/*!

This is the long-form manual for `irv_engine` and `irvtab`.

## Counting rules

The count is a single-winner instant runoff:
1. every ballot goes, with its full weight, to its highest ranked candidate still in the race;
   ballots that rank no remaining candidate are exhausted and are not counted;
2. a candidate with at least `total / 2 + 1` (integer division) of the counted weight wins;
3. otherwise the candidate with the lowest total is eliminated and a new round starts;
4. when several candidates share the lowest total, the count stops and reports a tie
   between them. No tie-break is applied.

A candidate that is the only one left wins, even without any vote. Withdrawn candidates never
take part in the count: their ballots go to the next choice from the first round on.

Contests with more than one seat are counted as single-winner contests, with a warning.

## Input formats

The following formats are supported:
* `blt` (the default) the BLT format, used by many STV and IRV counting tools
* `ballots` one ballot per line, in the canonical ballot format

### `blt`

```text
4 1
-4
3 1 2 0
4 2 0
2 3 1 0
1 0
0
"Anna"
"Bob"
"Clara"
"Dan"
"Mayor"
```

- the first line holds the number of candidates and the number of seats;
- an optional line of negative numbers lists the withdrawn candidates (here, `Dan`);
- each ballot line holds a weight, the chosen candidates by their position in the list of names
  (starting at 1) and a terminating `0`. A ballot without any choice (`1 0`) is allowed;
- a line with a single `0` ends the ballots;
- the names of the candidates follow, one per line and between double quotes, then the name
  of the contest.

Blank lines are ignored everywhere. Anything after the name of the contest is an error.

### `ballots`

```text
3 1 2
4 2
2 3 1
```

Each line holds the weight of the ballot (at least 1), then the chosen candidates by their
position (starting at 1). Extra spaces are ignored. Line endings may be `\n` or `\r\n`.

The names of the candidates come from the configuration file. When no configuration file is
given, the candidates are named `Candidate 1`, `Candidate 2`, ... up to the largest position
found in the ballots.

Both formats are read as UTF-8 by default. Latin-1 files are supported with
`--encoding latin-1` (or `"encoding": "latin-1"` in the configuration).

## Normalization

With `--normalize` (or `"normalize": true`), ballots with the same choices are merged into one
ballot carrying the sum of their weights, and the ballots are sorted by their choices. This
does not change the outcome of the count. It makes ballot files comparable and usually
much smaller.

## Configuration

The program accepts a configuration file in JSON:

```text
{
  "contestName": "Mayor",
  "candidates": [
    {"name": "Anna"},
    {"name": "Bob"},
    {"name": "Clara", "withdrawn": true}
  ],
  "seats": 1,
  "ballotsFile": "mayor.ballots",
  "ballotsFormat": "ballots",
  "encoding": "utf-8",
  "normalize": false,
  "notes": ["Precincts 1 to 4"]
}
```

Only `ballotsFile` is required. Its path is relative to the directory of the configuration
file. For a `blt` file, the candidates, seats and withdrawn candidates are taken from the file.
When `contestName` is given, it replaces the name of the contest found in the BLT file (or the
name of the ballots file, for the `ballots` format). The `notes` are added to the summary.

Command line options override the configuration: `--input`, `--input-type`, `--encoding`,
`--normalize`.

## Outputs

The summary of the count is written in JSON, to the standard output or to `--out <file>`:

```text
{
  "config": {"contest": "Mayor", "seats": 1, "threshold": "5"},
  "outcome": {"winner": "Anna"},
  "results": [
    {
      "round": 1,
      "tally": {"Anna": "3", "Bob": "4", "Clara": "2"},
      "tallyResults": [{"eliminated": "Clara"}]
    },
    ...
  ]
}
```

Counts are written as strings. `threshold` is the majority of the last round.
A tie is reported as `"outcome": {"tied": [...]}`, and the tied candidates appear with `tied`
entries in the `tallyResults` of the last round.

`--reference <file>` compares the summary with an expected one and fails on any difference,
after printing a diff.

`--ballots-out <file>` writes the ballots of the contest (after normalization, if requested)
in the canonical ballot format, and `--blt-out <file>` writes the whole contest in the BLT
format.

 */
